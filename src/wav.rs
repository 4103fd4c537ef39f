//! RIFF/WAVE container handling for narration audio.
//!
//! Narration comes back from the speech model as raw little-endian linear
//! PCM. Every scene is wrapped in an identical 44-byte canonical header so
//! the containers can later be spliced together byte-for-byte.

/// Sample rate of the speech model's PCM output.
pub const NARRATION_SAMPLE_RATE: u32 = 24_000;

/// Channel count of the speech model's PCM output.
pub const NARRATION_CHANNELS: u16 = 1;

/// Bit depth of the speech model's PCM output.
pub const NARRATION_BITS_PER_SAMPLE: u16 = 16;

/// Size of the canonical header written by [`pcm_to_wav`].
pub const WAV_HEADER_LEN: usize = 44;

/// MIME type of the container.
pub const WAV_MIME: &str = "audio/wav";

const PCM_FORMAT_CODE: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

/// Parsed header fields of a canonical PCM WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_size: u32,
    pub format_code: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Header describing `data_size` bytes of PCM in the given format.
    ///
    /// Fails when a derived field (block align, byte rate or RIFF size) does
    /// not fit its header slot.
    pub fn for_pcm(
        data_size: u32,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
    ) -> Result<Self, WavError> {
        let invalid = || WavError::InvalidFormat {
            channels,
            sample_rate,
            bits_per_sample,
        };
        let block_align = channels.checked_mul(bits_per_sample).ok_or_else(invalid)? / 8;
        let byte_rate = sample_rate
            .checked_mul(u32::from(block_align))
            .ok_or_else(invalid)?;
        let riff_size = data_size
            .checked_add(36)
            .ok_or(WavError::TooLarge(data_size as usize))?;

        Ok(Self {
            riff_size,
            format_code: PCM_FORMAT_CODE,
            channels,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample,
            data_size,
        })
    }

    /// Whether two headers describe the same sample format.
    pub fn same_format(&self, other: &WavHeader) -> bool {
        self.format_code == other.format_code
            && self.channels == other.channels
            && self.sample_rate == other.sample_rate
            && self.bits_per_sample == other.bits_per_sample
    }

    fn write_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&self.riff_size.to_le_bytes());
        out.extend_from_slice(b"WAVE");

        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        out.extend_from_slice(&self.format_code.to_le_bytes());
        out.extend_from_slice(&self.channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&self.byte_rate.to_le_bytes());
        out.extend_from_slice(&self.block_align.to_le_bytes());
        out.extend_from_slice(&self.bits_per_sample.to_le_bytes());

        out.extend_from_slice(b"data");
        out.extend_from_slice(&self.data_size.to_le_bytes());
    }
}

/// Errors from reading or building a WAV container.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WavError {
    #[error("WAV data too short: {len} bytes")]
    Truncated { len: usize },

    #[error("missing '{tag}' chunk tag at offset {offset}")]
    BadTag { tag: &'static str, offset: usize },

    #[error("unsupported WAV format code {0} (only PCM is supported)")]
    UnsupportedFormat(u16),

    #[error("declared data size {declared} exceeds available {available} bytes")]
    DataOverrun { declared: usize, available: usize },

    #[error("WAV payload of {0} bytes does not fit a 32-bit container")]
    TooLarge(usize),

    #[error("scene audio formats differ and cannot be merged")]
    FormatMismatch,

    #[error(
        "{channels} channels of {bits_per_sample}-bit PCM at {sample_rate} Hz cannot be described by a WAV header"
    )]
    InvalidFormat {
        channels: u16,
        sample_rate: u32,
        bits_per_sample: u16,
    },
}

/// Wrap raw PCM samples in a self-contained WAV container.
pub fn pcm_to_wav(
    pcm: &[u8],
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
) -> Result<Vec<u8>, WavError> {
    let data_size = u32::try_from(pcm.len()).map_err(|_| WavError::TooLarge(pcm.len()))?;
    let header = WavHeader::for_pcm(data_size, sample_rate, channels, bits_per_sample)?;
    let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    header.write_into(&mut out);
    out.extend_from_slice(pcm);
    Ok(out)
}

/// Wrap narration PCM using the speech model's fixed format.
pub fn narration_wav(pcm: &[u8]) -> Result<Vec<u8>, WavError> {
    pcm_to_wav(
        pcm,
        NARRATION_SAMPLE_RATE,
        NARRATION_CHANNELS,
        NARRATION_BITS_PER_SAMPLE,
    )
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn expect_tag(bytes: &[u8], offset: usize, tag: &'static str) -> Result<(), WavError> {
    if &bytes[offset..offset + 4] == tag.as_bytes() {
        Ok(())
    } else {
        Err(WavError::BadTag { tag, offset })
    }
}

/// Parse a canonical 44-byte header and return it with the PCM payload.
pub fn read_wav(bytes: &[u8]) -> Result<(WavHeader, &[u8]), WavError> {
    if bytes.len() < WAV_HEADER_LEN {
        return Err(WavError::Truncated { len: bytes.len() });
    }
    expect_tag(bytes, 0, "RIFF")?;
    expect_tag(bytes, 8, "WAVE")?;
    expect_tag(bytes, 12, "fmt ")?;
    expect_tag(bytes, 36, "data")?;

    let header = WavHeader {
        riff_size: u32_at(bytes, 4),
        format_code: u16_at(bytes, 20),
        channels: u16_at(bytes, 22),
        sample_rate: u32_at(bytes, 24),
        byte_rate: u32_at(bytes, 28),
        block_align: u16_at(bytes, 32),
        bits_per_sample: u16_at(bytes, 34),
        data_size: u32_at(bytes, 40),
    };
    if header.format_code != PCM_FORMAT_CODE {
        return Err(WavError::UnsupportedFormat(header.format_code));
    }

    let available = bytes.len() - WAV_HEADER_LEN;
    let declared = header.data_size as usize;
    if declared > available {
        return Err(WavError::DataOverrun {
            declared,
            available,
        });
    }
    Ok((header, &bytes[WAV_HEADER_LEN..WAV_HEADER_LEN + declared]))
}

/// Byte-level splice: containers are concatenated headers and all.
///
/// Only meaningful because every scene container shares one format; players
/// that honour the first data chunk size stop after the first scene.
pub fn splice<'a>(containers: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    for container in containers {
        out.extend_from_slice(container);
    }
    out
}

/// True merge: strip every header, concatenate the PCM and write one header.
pub fn merge<'a>(containers: impl IntoIterator<Item = &'a [u8]>) -> Result<Vec<u8>, WavError> {
    let mut format: Option<WavHeader> = None;
    let mut pcm = Vec::new();

    for container in containers {
        let (header, data) = read_wav(container)?;
        match &format {
            Some(first) if !first.same_format(&header) => return Err(WavError::FormatMismatch),
            Some(_) => {}
            None => format = Some(header),
        }
        pcm.extend_from_slice(data);
    }

    let (sample_rate, channels, bits_per_sample) = format
        .map(|f| (f.sample_rate, f.channels, f.bits_per_sample))
        .unwrap_or((
            NARRATION_SAMPLE_RATE,
            NARRATION_CHANNELS,
            NARRATION_BITS_PER_SAMPLE,
        ));
    pcm_to_wav(&pcm, sample_rate, channels, bits_per_sample)
}

/// Playback length of a container's PCM payload in seconds.
pub fn duration_secs(header: &WavHeader) -> f64 {
    if header.byte_rate == 0 {
        return 0.0;
    }
    header.data_size as f64 / header.byte_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pcm(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_header_layout() {
        let wav = narration_wav(&sample_pcm(480)).unwrap();

        assert_eq!(wav.len(), WAV_HEADER_LEN + 480);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 4), 36 + 480);
        assert_eq!(u32_at(&wav, 16), 16);
        assert_eq!(u16_at(&wav, 20), 1);
        assert_eq!(u16_at(&wav, 22), 1);
        assert_eq!(u32_at(&wav, 24), 24_000);
        assert_eq!(u32_at(&wav, 28), 48_000);
        assert_eq!(u16_at(&wav, 32), 2);
        assert_eq!(u16_at(&wav, 34), 16);
        assert_eq!(u32_at(&wav, 40), 480);
    }

    #[test]
    fn test_read_back_reproduces_pcm() {
        let pcm = sample_pcm(1000);
        let wav = narration_wav(&pcm).unwrap();

        let (header, data) = read_wav(&wav).unwrap();
        assert_eq!(header.data_size as usize, wav.len() - WAV_HEADER_LEN);
        assert_eq!(
            header.byte_rate,
            header.sample_rate * header.channels as u32 * header.bits_per_sample as u32 / 8
        );
        assert_eq!(data, pcm.as_slice());
    }

    #[test]
    fn test_stereo_header_fields() {
        let wav = pcm_to_wav(&sample_pcm(64), 44_100, 2, 16).unwrap();
        let (header, _) = read_wav(&wav).unwrap();
        assert_eq!(header.block_align, 4);
        assert_eq!(header.byte_rate, 176_400);
    }

    #[test]
    fn test_empty_pcm_is_valid_container() {
        let wav = narration_wav(&[]).unwrap();
        let (header, data) = read_wav(&wav).unwrap();
        assert_eq!(header.data_size, 0);
        assert!(data.is_empty());
    }

    #[test]
    fn test_read_rejects_short_input() {
        assert_eq!(read_wav(b"RIFF"), Err(WavError::Truncated { len: 4 }));
    }

    #[test]
    fn test_read_rejects_bad_tag() {
        let mut wav = narration_wav(&sample_pcm(8)).unwrap();
        wav[8..12].copy_from_slice(b"AVI ");
        assert_eq!(
            read_wav(&wav),
            Err(WavError::BadTag {
                tag: "WAVE",
                offset: 8
            })
        );
    }

    #[test]
    fn test_read_rejects_overrun() {
        let mut wav = narration_wav(&sample_pcm(8)).unwrap();
        wav.truncate(WAV_HEADER_LEN + 4);
        assert!(matches!(read_wav(&wav), Err(WavError::DataOverrun { .. })));
    }

    #[test]
    fn test_splice_keeps_every_header() {
        let a = narration_wav(&sample_pcm(10)).unwrap();
        let b = narration_wav(&sample_pcm(20)).unwrap();
        let spliced = splice([a.as_slice(), b.as_slice()]);

        assert_eq!(spliced.len(), a.len() + b.len());
        assert_eq!(&spliced[a.len()..a.len() + 4], b"RIFF");
        // The first header still only describes the first scene.
        let (header, _) = read_wav(&spliced).unwrap();
        assert_eq!(header.data_size, 10);
    }

    #[test]
    fn test_merge_writes_single_header() {
        let a_pcm = sample_pcm(10);
        let b_pcm = sample_pcm(30);
        let a = narration_wav(&a_pcm).unwrap();
        let b = narration_wav(&b_pcm).unwrap();

        let merged = merge([a.as_slice(), b.as_slice()]).unwrap();
        let (header, data) = read_wav(&merged).unwrap();

        assert_eq!(header.data_size, 40);
        assert_eq!(merged.len(), WAV_HEADER_LEN + 40);
        assert_eq!(&data[..10], a_pcm.as_slice());
        assert_eq!(&data[10..], b_pcm.as_slice());
    }

    #[test]
    fn test_merge_rejects_mixed_formats() {
        let a = narration_wav(&sample_pcm(10)).unwrap();
        let b = pcm_to_wav(&sample_pcm(10), 44_100, 2, 16).unwrap();
        assert_eq!(
            merge([a.as_slice(), b.as_slice()]),
            Err(WavError::FormatMismatch)
        );
    }

    #[test]
    fn test_header_rejects_unrepresentable_fields() {
        assert_eq!(
            WavHeader::for_pcm(0, 24_000, u16::MAX, 16),
            Err(WavError::InvalidFormat {
                channels: u16::MAX,
                sample_rate: 24_000,
                bits_per_sample: 16
            })
        );
        assert!(matches!(
            WavHeader::for_pcm(0, u32::MAX, 2, 16),
            Err(WavError::InvalidFormat { .. })
        ));
        assert_eq!(
            WavHeader::for_pcm(u32::MAX - 35, 24_000, 1, 16),
            Err(WavError::TooLarge((u32::MAX - 35) as usize))
        );
        assert_eq!(
            WavHeader::for_pcm(u32::MAX - 36, 24_000, 1, 16)
                .unwrap()
                .riff_size,
            u32::MAX
        );
    }

    #[test]
    fn test_duration() {
        let wav = narration_wav(&sample_pcm(48_000)).unwrap();
        let (header, _) = read_wav(&wav).unwrap();
        assert!((duration_secs(&header) - 1.0).abs() < f64::EPSILON);
    }
}
