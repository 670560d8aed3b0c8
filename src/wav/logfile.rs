//! The `time value` text format of recorded channels.

use std::io::{BufRead, Write};

use log::warn;

use super::SampleSink;
use crate::circuit::LogChannel;
use crate::error::Result;

/// Write a channel as one `time value` line per sample, time in seconds.
pub fn write_log<W: Write>(channel: &LogChannel, mut out: W) -> Result<()> {
    for (t, v) in &channel.samples {
        writeln!(out, "{:.9} {:.9}", t.as_fp(), v)?;
    }
    out.flush()?;
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
struct Head {
    time: f64,
    value: f64,
    pending: bool,
    eof: bool,
}

/// Replay several logs into `sink` in time order.
///
/// Channel numbers are the reader positions. Of samples with equal time the
/// lower channel goes first. Lines that don't hold two numbers are skipped
/// with a warning.
pub fn merge_logs<R: BufRead, S: SampleSink>(readers: &mut [R], sink: &mut S) -> Result<()> {
    let mut heads = vec![Head::default(); readers.len()];
    let mut line = String::new();

    loop {
        for (reader, head) in readers.iter_mut().zip(heads.iter_mut()) {
            while !head.pending && !head.eof {
                line.clear();
                if reader.read_line(&mut line)? == 0 {
                    head.eof = true;
                    break;
                }
                match parse_line(&line) {
                    Some((time, value)) => {
                        head.time = time;
                        head.value = value;
                        head.pending = true;
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!("arg: <{}>", line.trim_end()),
                }
            }
        }

        let next = heads
            .iter()
            .enumerate()
            .filter(|(_, h)| h.pending)
            .min_by(|(_, a), (_, b)| a.time.total_cmp(&b.time))
            .map(|(i, _)| i);
        let Some(chan) = next else {
            return Ok(());
        };
        let head = &mut heads[chan];
        head.pending = false;
        sink.process(chan, head.time, head.value)?;
    }
}

fn parse_line(line: &str) -> Option<(f64, f64)> {
    let mut it = line.split_whitespace();
    let time = it.next()?.parse().ok()?;
    let value = it.next()?.parse().ok()?;
    Some((time, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::NetlistTime;
    use std::io::{BufReader, Cursor, Seek, SeekFrom};

    #[derive(Default)]
    struct Collect(Vec<(usize, f64, f64)>);

    impl SampleSink for Collect {
        fn process(&mut self, chan: usize, time: f64, value: f64) -> Result<()> {
            self.0.push((chan, time, value));
            Ok(())
        }
    }

    #[test]
    fn test_merge_in_time_order() {
        let mut readers = vec![
            Cursor::new("0.0 1\n0.3 2\n0.4 3\n"),
            Cursor::new("0.1 5\nnot a sample\n\n0.3 6\n"),
        ];
        let mut sink = Collect::default();
        merge_logs(&mut readers, &mut sink).unwrap();

        let order: Vec<(usize, f64)> = sink.0.iter().map(|&(c, _, v)| (c, v)).collect();
        assert_eq!(order, vec![(0, 1.0), (1, 5.0), (0, 2.0), (1, 6.0), (0, 3.0)]);
    }

    #[test]
    fn test_written_log_reads_back() {
        let channel = LogChannel {
            name: "log_out".into(),
            samples: vec![
                (NetlistTime::from_usec(1), 0.5),
                (NetlistTime::from_usec(2), -1.25),
            ],
        };
        let mut file = tempfile::tempfile().unwrap();
        write_log(&channel, &mut file).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut sink = Collect::default();
        merge_logs(&mut [BufReader::new(file)], &mut sink).unwrap();
        assert_eq!(sink.0.len(), 2);
        approx::assert_relative_eq!(sink.0[0].1, 1e-6);
        approx::assert_relative_eq!(sink.0[1].2, -1.25);
    }
}
