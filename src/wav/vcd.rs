//! Value change dump output.

use std::io::Write;

use super::SampleSink;
use crate::error::{NetlistError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcdFormat {
    /// `real` variables carrying the value
    Analog,
    /// one bit `wire` variables, thresholded
    Digital,
}

/// Writes channels as VCD variables named `@`, `A`, `B`, ...
///
/// Changes are collected per time stamp and written when time moves on.
/// In digital mode values between the low and high level leave the wire
/// unchanged.
#[derive(Debug)]
pub struct VcdWriter<W: Write> {
    out: W,
    format: VcdFormat,
    ids: Vec<char>,
    high: f64,
    low: f64,
    last_time: f64,
    buf: String,
}

impl<W: Write> VcdWriter<W> {
    pub fn new(mut out: W, channels: &[String], format: VcdFormat, high: f64, low: f64) -> Result<Self> {
        let ids: Vec<char> = (64u8..64 + 26).map(char::from).collect();
        if channels.len() > ids.len() {
            return Err(NetlistError::invalid_data(
                "vcd",
                format!("at most {} channels supported, got {}", ids.len(), channels.len()),
            ));
        }

        writeln!(out, "$date Sat Jan 19 14:14:17 2019")?;
        writeln!(out, "$end")?;
        writeln!(out, "$version Netlist nlwav 0.1")?;
        writeln!(out, "$end")?;
        writeln!(out, "$timescale 1 ns")?;
        writeln!(out, "$end")?;
        for (id, name) in ids.iter().zip(channels) {
            match format {
                VcdFormat::Analog => writeln!(out, "$var real 64 {} {} $end", id, name)?,
                VcdFormat::Digital => writeln!(out, "$var wire 1 {} {} $end", id, name)?,
            }
        }
        writeln!(out, "$enddefinitions $end")?;
        if format == VcdFormat::Analog {
            writeln!(out, "$dumpvars")?;
            for id in ids.iter().take(channels.len()) {
                writeln!(out, "r0.0 {}", id)?;
            }
            writeln!(out, "$end")?;
        }

        Ok(Self {
            out,
            format,
            ids,
            high,
            low,
            last_time: 0.0,
            buf: String::new(),
        })
    }

    /// Write the changes still buffered and hand back the stream.
    pub fn finish(mut self) -> Result<W> {
        self.flush_changes()?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn flush_changes(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            writeln!(self.out, "#{} {}", (self.last_time * 1e9).round() as i64, self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl<W: Write> SampleSink for VcdWriter<W> {
    fn process(&mut self, chan: usize, time: f64, value: f64) -> Result<()> {
        if time > self.last_time {
            self.flush_changes()?;
            self.last_time = time;
        }
        let Some(&id) = self.ids.get(chan) else {
            return Ok(());
        };
        match self.format {
            VcdFormat::Analog => self.buf.push_str(&format!("r{} {} ", value, id)),
            VcdFormat::Digital if value >= self.high => self.buf.push_str(&format!("1{} ", id)),
            VcdFormat::Digital if value <= self.low => self.buf.push_str(&format!("0{} ", id)),
            VcdFormat::Digital => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analog_dump() {
        let names = vec!["out".to_string(), "in".to_string()];
        let mut vcd = VcdWriter::new(Vec::new(), &names, VcdFormat::Analog, 2.0, 1.0).unwrap();
        vcd.process(0, 0.0, 1.5).unwrap();
        vcd.process(1, 1e-6, 0.25).unwrap();
        let text = String::from_utf8(vcd.finish().unwrap()).unwrap();

        assert!(text.starts_with("$date"));
        assert!(text.contains("$version Netlist nlwav 0.1\n"));
        assert!(text.contains("$timescale 1 ns\n"));
        assert!(text.contains("$var real 64 @ out $end\n"));
        assert!(text.contains("$var real 64 A in $end\n"));
        assert!(text.contains("$dumpvars\nr0.0 @\nr0.0 A\n$end\n"));
        assert!(text.contains("#0 r1.5 @ \n"));
        assert!(text.ends_with("#1000 r0.25 A \n"));
    }

    #[test]
    fn test_digital_thresholds() {
        let names = vec!["clk".to_string()];
        let mut vcd = VcdWriter::new(Vec::new(), &names, VcdFormat::Digital, 2.0, 1.0).unwrap();
        vcd.process(0, 1e-9, 3.0).unwrap();
        vcd.process(0, 2e-9, 1.5).unwrap();
        vcd.process(0, 3e-9, 0.2).unwrap();
        let text = String::from_utf8(vcd.finish().unwrap()).unwrap();

        assert!(text.contains("$var wire 1 @ clk $end\n"));
        assert!(!text.contains("$dumpvars"));
        assert!(text.contains("#1 1@ \n"));
        // 1.5 V is neither high nor low
        assert!(!text.contains("#2"));
        assert!(text.ends_with("#3 0@ \n"));
    }

    #[test]
    fn test_too_many_channels() {
        let names: Vec<String> = (0..27).map(|i| format!("c{}", i)).collect();
        assert!(VcdWriter::new(Vec::new(), &names, VcdFormat::Analog, 2.0, 1.0).is_err());
    }
}
