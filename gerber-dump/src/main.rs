use std::fs::read_to_string;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use gerber::cam::CamFile;
use gerber::excellon::ExcellonFile;
use gerber::gerber::GerberFile;
use gerber::ipc356::Netlist;
use gerber::units::Unit;

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Gerber,
    Excellon,
    Ipc356,
}

#[derive(Parser)]
struct Cli {
    /// Name of the file to dump
    filename: PathBuf,

    /// Which parser to run; inferred from the extension if omitted
    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Also render the parsed layer to an SVG file
    #[arg(long)]
    svg: Option<PathBuf>,
}

fn guess_format(filename: &std::path::Path) -> Format {
    match filename.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase().as_str() {
        "drl" | "xnc" | "exc" => Format::Excellon,
        "ipc" | "ipc356" => Format::Ipc356,
        _ => Format::Gerber,
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let src = read_to_string(&cli.filename)?;
    let format = cli.format.unwrap_or_else(|| guess_format(&cli.filename));

    match format {
        Format::Gerber => {
            let layer = GerberFile::parse(&src)?;
            println!("{layer:#?}");
            if let Some(svg_path) = &cli.svg {
                std::fs::write(svg_path, layer.to_svg(0.1, Unit::Millimeter, Unit::Millimeter, None, "#000", "#fff"))?;
            }
        }
        Format::Excellon => {
            let layer = ExcellonFile::parse(&src, None)?;
            println!("{layer:#?}");
            if let Some(svg_path) = &cli.svg {
                std::fs::write(svg_path, layer.to_svg(0.1, Unit::Millimeter, Unit::Millimeter, None, "#000", "#fff"))?;
            }
        }
        Format::Ipc356 => {
            let netlist = Netlist::parse(&src)?;
            println!("{netlist:#?}");
            if cli.svg.is_some() {
                eprintln!("--svg has no effect for IPC-356 netlists");
            }
        }
    }

    Ok(())
}
