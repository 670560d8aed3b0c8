use std::io::Write;

use super::SampleSink;
use crate::error::Result;

/// Samples all channels at `start + k * inc` for `count` rows and writes
/// them comma separated, one row per sample point.
#[derive(Debug)]
pub struct TabWriter<W: Write> {
    out: W,
    inc: f64,
    count: usize,
    next_time: f64,
    last_time: f64,
    written: usize,
    values: Vec<f64>,
}

impl<W: Write> TabWriter<W> {
    pub fn new(out: W, channels: usize, start: f64, inc: f64, count: usize) -> Self {
        Self {
            out,
            inc,
            count,
            next_time: start,
            last_time: 0.0,
            written: 0,
            values: vec![0.0; channels],
        }
    }

    pub fn rows(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> SampleSink for TabWriter<W> {
    fn process(&mut self, chan: usize, time: f64, value: f64) -> Result<()> {
        if time > self.last_time {
            while self.next_time < time && self.written < self.count {
                let row: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
                writeln!(self.out, "{}", row.join(","))?;
                self.written += 1;
                self.next_time += self.inc;
            }
            self.last_time = time;
        }
        if let Some(v) = self.values.get_mut(chan) {
            *v = value;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_hold_last_values() {
        let mut tab = TabWriter::new(Vec::new(), 2, 0.5, 1.0, 3);
        tab.process(0, 0.0, 1.0).unwrap();
        tab.process(1, 0.0, 2.0).unwrap();
        tab.process(0, 1.2, 3.0).unwrap();
        tab.process(0, 10.0, 4.0).unwrap();
        assert_eq!(tab.rows(), 3);
        let text = String::from_utf8(tab.finish().unwrap()).unwrap();
        assert_eq!(text, "1,2\n3,2\n3,2\n");
    }
}
