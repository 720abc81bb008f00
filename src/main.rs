use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

mod formats;
mod media_types;

use formats::d88::{classify_io, D88Error, D88Handler};

#[derive(Parser)]
#[command(about = "D88 Disk Image Media Type Utility")]
struct Cli {
    /// Path to the image file
    input: PathBuf,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the image header
    Display {
        #[arg(long)]
        ascii: bool,
    },
    /// Force the media type to 1DD (the default when no subcommand is given)
    Convert {
        #[arg(long)]
        check: bool,
        #[arg(long)]
        verbose: bool,
        #[arg(long)]
        validate: bool,
    },
}

fn load_image(path: &Path) -> Result<D88Handler, D88Error> {
    let metadata = fs::metadata(path).map_err(|e| classify_io(e, path))?;
    if !metadata.is_file() {
        return Err(D88Error::NotFound(path.to_path_buf()));
    }

    let mut file = File::open(path).map_err(|e| classify_io(e, path))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).map_err(|e| classify_io(e, path))?;
    Ok(D88Handler::new(data))
}

/// Output name: the argument string as given, prefixed. The directory
/// part is deliberately not isolated.
fn output_path(input: &Path) -> PathBuf {
    PathBuf::from(format!("1dd-{}", input.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut handler = load_image(&cli.input)?;

    match cli.command.unwrap_or(Commands::Convert { check: false, verbose: false, validate: false }) {
        Commands::Display { ascii } => println!("{}", handler.display(ascii)?),
        Commands::Convert { check, verbose, validate } => {
            if check {
                handler.check_header()?;
            }
            handler.convert(&output_path(&cli.input), verbose, validate)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_types::{MEDIA_1D, MEDIA_1DD};
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn output_path_prefixes_the_argument() {
        assert_eq!(output_path(Path::new("disk.d88")), PathBuf::from("1dd-disk.d88"));
    }

    #[test]
    fn output_path_keeps_directory_separators_verbatim() {
        // The prefix lands before the directory part.
        assert_eq!(
            output_path(Path::new("images/disk.d88")),
            PathBuf::from("1dd-images/disk.d88")
        );
    }

    #[test]
    fn load_image_classifies_missing_input() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.d88");
        match load_image(&missing) {
            Err(D88Error::NotFound(path)) => assert_eq!(path, missing),
            Err(e) => panic!("expected NotFound, got {:?}", e),
            Ok(_) => panic!("expected NotFound, got success"),
        }
    }

    #[test]
    fn load_image_rejects_directories() {
        let dir = TempDir::new().unwrap();
        match load_image(dir.path()) {
            Err(D88Error::NotFound(_)) => {}
            Err(e) => panic!("expected NotFound, got {:?}", e),
            Ok(_) => panic!("expected NotFound, got success"),
        }
    }

    #[test]
    fn load_then_convert_round_trip() {
        // 32 zero bytes with a 1D media type byte.
        let dir = TempDir::new().unwrap();
        let input_path = dir.path().join("disk.d88");
        let mut image = vec![0u8; 32];
        image[0x1B] = MEDIA_1D.code;
        File::create(&input_path).unwrap().write_all(&image).unwrap();

        let mut handler = load_image(&input_path).unwrap();
        let out = dir.path().join("1dd-disk.d88");
        let old = handler.convert(&out, false, false).unwrap();
        assert_eq!(old, MEDIA_1D.code);

        let written = fs::read(&out).unwrap();
        assert_eq!(written.len(), 32);
        assert_eq!(written[0x1B], MEDIA_1DD.code);
        let mut expected = image;
        expected[0x1B] = MEDIA_1DD.code;
        assert_eq!(written, expected);
    }
}
