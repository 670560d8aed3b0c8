//! 16 bit PCM RIFF/WAVE output.

use std::io::{Seek, SeekFrom, Write};

use super::SampleSink;
use crate::error::Result;

const BITS_PER_SAMPLE: u16 = 16;
const HEADER_LEN: u32 = 44;
/// Length placeholder for streams we can't go back into
const UNKNOWN_LEN: u32 = 0xffff_ffff;

/// Raw WAV writer.
///
/// The header is written up front. On a seekable stream [`finalize`]
/// goes back and fills in the RIFF and data lengths; otherwise both stay
/// at `0xffffffff` so players read until end of stream.
///
/// [`finalize`]: WavWriter::finalize
#[derive(Debug)]
pub struct WavWriter<W: Write> {
    out: W,
    seekable: bool,
    channels: u16,
    sample_rate: u32,
    data_len: u32,
}

impl<W: Write> WavWriter<W> {
    pub fn new(out: W, seekable: bool, sample_rate: u32, channels: u16) -> Result<Self> {
        let mut writer = Self {
            out,
            seekable,
            channels,
            sample_rate,
            data_len: 0,
        };
        let len = if seekable { 0 } else { UNKNOWN_LEN };
        writer.write_header(len, len)?;
        Ok(writer)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn block_align(&self) -> u16 {
        self.channels * BITS_PER_SAMPLE.div_ceil(8)
    }

    /// Bytes of sample data written so far.
    pub fn data_len(&self) -> u32 {
        self.data_len
    }

    fn write_header(&mut self, riff_len: u32, data_len: u32) -> Result<()> {
        let block_align = self.block_align();
        let mut h = Vec::with_capacity(HEADER_LEN as usize);
        h.extend_from_slice(b"RIFF");
        h.extend_from_slice(&riff_len.to_le_bytes());
        h.extend_from_slice(b"WAVE");
        h.extend_from_slice(b"fmt ");
        h.extend_from_slice(&16u32.to_le_bytes());
        h.extend_from_slice(&1u16.to_le_bytes()); // PCM
        h.extend_from_slice(&self.channels.to_le_bytes());
        h.extend_from_slice(&self.sample_rate.to_le_bytes());
        h.extend_from_slice(&(self.sample_rate * u32::from(block_align)).to_le_bytes());
        h.extend_from_slice(&block_align.to_le_bytes());
        h.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
        h.extend_from_slice(b"data");
        h.extend_from_slice(&data_len.to_le_bytes());
        self.out.write_all(&h)?;
        Ok(())
    }

    /// Write one frame, one value per channel.
    pub fn write_sample(&mut self, frame: &[i32]) -> Result<()> {
        self.data_len = self.data_len.saturating_add(u32::from(self.block_align()));
        for &s in frame.iter().take(self.channels as usize) {
            self.out.write_all(&(s as i16).to_le_bytes())?;
        }
        Ok(())
    }

    /// Flush and hand back the stream without touching the header.
    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write + Seek> WavWriter<W> {
    /// Patch the header lengths (seekable streams only) and hand back the
    /// stream.
    pub fn finalize(mut self) -> Result<W> {
        if self.seekable {
            let data_len = self.data_len;
            self.out.seek(SeekFrom::Start(0))?;
            self.write_header(data_len + HEADER_LEN - 8, data_len)?;
            self.out.seek(SeekFrom::End(0))?;
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Turns aggregated channel values into WAV frames.
///
/// Each channel runs a slow mean filter, `mean += 5/rate * (x - mean)`, to
/// remove DC; the output is `(x - mean) * amp` clamped to +-32000.
#[derive(Debug)]
pub struct WavSink<W: Write> {
    wav: WavWriter<W>,
    amp: f64,
    mean: Vec<f64>,
    samples: Vec<i32>,
    last_time: f64,
}

impl<W: Write> WavSink<W> {
    pub fn new(wav: WavWriter<W>, amp: f64) -> Self {
        let channels = wav.channels() as usize;
        Self {
            wav,
            amp,
            mean: vec![0.0; channels],
            samples: vec![0; channels],
            last_time: 0.0,
        }
    }

    /// Current DC estimate per channel.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn into_writer(self) -> WavWriter<W> {
        self.wav
    }
}

impl<W: Write> SampleSink for WavSink<W> {
    fn process(&mut self, chan: usize, time: f64, value: f64) -> Result<()> {
        if time > self.last_time {
            self.wav.write_sample(&self.samples)?;
        }
        self.last_time = time;
        let Some(mean) = self.mean.get_mut(chan) else {
            return Ok(());
        };
        *mean += 5.0 / f64::from(self.wav.sample_rate()) * (value - *mean);
        let out = ((value - *mean) * self.amp).clamp(-32000.0, 32000.0);
        self.samples[chan] = out as i32;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn u16_at(b: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([b[at], b[at + 1]])
    }

    fn u32_at(b: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
    }

    #[test]
    fn test_header_patched_on_seekable_file() {
        let file = tempfile::tempfile().unwrap();
        let mut w = WavWriter::new(file, true, 44100, 2).unwrap();
        for i in 0..100 {
            w.write_sample(&[i * 100, -i * 100]).unwrap();
        }
        let mut file = w.finalize().unwrap();

        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_end(&mut bytes).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(u16_at(&bytes, 20), 1);
        assert_eq!(u16_at(&bytes, 22), 2);
        assert_eq!(u32_at(&bytes, 24), 44100);
        assert_eq!(u32_at(&bytes, 28), 44100 * 4);
        assert_eq!(u16_at(&bytes, 32), 4);
        assert_eq!(u16_at(&bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(&bytes, 40), 100 * 2 * 2);
        assert_eq!(u32_at(&bytes, 4), 100 * 2 * 2 + 36);
        assert_eq!(bytes.len(), 44 + 400);
        // second frame, right channel
        assert_eq!(i16::from_le_bytes([bytes[46], bytes[47]]), -100);
    }

    #[test]
    fn test_stream_keeps_unknown_length() {
        let mut w = WavWriter::new(Vec::new(), false, 48000, 1).unwrap();
        w.write_sample(&[1]).unwrap();
        let bytes = w.into_inner().unwrap();
        assert_eq!(u32_at(&bytes, 4), UNKNOWN_LEN);
        assert_eq!(u32_at(&bytes, 40), UNKNOWN_LEN);
        assert_eq!(bytes.len(), 46);
    }

    #[test]
    fn test_sink_removes_dc_and_clamps() {
        let wav = WavWriter::new(Cursor::new(Vec::new()), true, 1000, 1).unwrap();
        let mut sink = WavSink::new(wav, 10000.0);
        for i in 0..5000 {
            sink.process(0, i as f64 * 1e-3, 2.5).unwrap();
        }
        // the mean converges to the DC level, the output towards zero
        assert!((sink.mean()[0] - 2.5).abs() < 1e-6);
        assert_eq!(sink.samples[0], 0);

        sink.process(0, 5.0, 100.0).unwrap();
        assert_eq!(sink.samples[0], 32000);
        let bytes = sink.into_writer().finalize().unwrap().into_inner();
        // one frame per time step, the first value is written at the second
        assert_eq!(u32_at(&bytes, 40), 5000 * 2);
    }
}
