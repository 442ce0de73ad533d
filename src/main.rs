use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::info;

use comcc::codegen::COM_CAPACITY;
use comcc::{CompileOptions, generate_image_with};

/// Compile a source file into a 16-bit DOS .COM executable.
#[derive(Parser, Debug)]
#[command(name = "comcc")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Source file to compile
  #[arg(value_name = "INPUT")]
  input: PathBuf,

  /// Where to write the image (defaults to INPUT with a .com extension)
  #[arg(short, long, value_name = "FILE")]
  output: Option<PathBuf>,

  /// Function the startup stub calls
  #[arg(long, value_name = "NAME", default_value = "main")]
  entry: String,

  /// Maximum image size in bytes
  #[arg(long, value_name = "BYTES", default_value_t = COM_CAPACITY)]
  capacity: usize,
}

fn main() {
  env_logger::init();
  let cli = Cli::parse();

  let source = match fs::read_to_string(&cli.input) {
    Ok(source) => source,
    Err(err) => {
      eprintln!("error reading '{}': {err}", cli.input.display());
      process::exit(1);
    }
  };

  let options = CompileOptions {
    capacity: cli.capacity,
    entry_point: cli.entry,
    ..CompileOptions::default()
  };
  let image = match generate_image_with(&source, &options) {
    Ok(image) => image,
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  };

  let output = cli
    .output
    .unwrap_or_else(|| cli.input.with_extension("com"));
  if let Err(err) = fs::write(&output, &image) {
    eprintln!("error writing '{}': {err}", output.display());
    process::exit(1);
  }
  info!("wrote {} byte(s) to {}", image.len(), output.display());
}
