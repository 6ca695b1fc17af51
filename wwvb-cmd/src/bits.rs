use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use wwvb::{
    classify::{BitClassifier, Symbol},
    Config,
};

use crate::{capture, Format};

#[derive(Serialize)]
struct BitRow {
    edge: Option<u64>,
    symbol: Symbol,
    phase_valid: bool,
    quality: u8,
}

pub fn run(input: &Path, format: Format) -> Result<()> {
    let pulses = capture::read_pulses(input)?;

    let mut bits = BitClassifier::new(pulses.into_iter(), Config::default());
    let snr = bits.snr();
    let mut rows = Vec::new();

    while let Some(bit) = bits.next_bit() {
        rows.push(BitRow {
            edge: bit.edge,
            symbol: bit.symbol,
            phase_valid: bit.phase_valid,
            quality: snr.lock().expect("snr window poisoned").quality(),
        });
    }

    match format {
        Format::Text => {
            for row in &rows {
                let edge = row
                    .edge
                    .map_or_else(|| "-".to_string(), |edge| edge.to_string());
                println!(
                    "{edge:>12} {:<7} phase_valid={} quality={}",
                    symbol_name(row.symbol),
                    row.phase_valid,
                    row.quality
                );
            }
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
    }

    Ok(())
}

fn symbol_name(symbol: Symbol) -> &'static str {
    match symbol {
        Symbol::Zero => "zero",
        Symbol::One => "one",
        Symbol::Marker => "marker",
        Symbol::Invalid => "invalid",
    }
}
