use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use wwvb::pulse::Pulse;

/// Read a recorded pulse capture: one `edge_ms,width_ms` pair per line.
pub fn read_pulses(path: &Path) -> Result<Vec<Pulse>> {
    let file = File::open(path).with_context(|| format!("opening {path:?}"))?;
    let mut pulses = Vec::new();

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let Some((edge, width)) = line.split_once(',') else {
            bail!("line {}: expected edge_ms,width_ms", index + 1);
        };
        pulses.push(Pulse {
            edge: edge
                .trim()
                .parse()
                .with_context(|| format!("line {}: bad edge time", index + 1))?,
            width_ms: width
                .trim()
                .parse()
                .with_context(|| format!("line {}: bad width", index + 1))?,
        });
    }

    Ok(pulses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_pairs_and_skips_comments() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# seed\n0,200\n1000, 800 # marker\n\n2000,800").unwrap();
        let pulses = read_pulses(file.path()).unwrap();
        assert_eq!(pulses.len(), 3);
        assert_eq!(pulses[1].edge, 1000);
        assert_eq!(pulses[1].width_ms, 800);
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "0,200\nnot-a-pair").unwrap();
        let err = read_pulses(file.path()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
