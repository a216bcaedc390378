use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::wav;

#[derive(Debug, Clone)]
pub struct CaptureError {
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CaptureError {}

fn err(code: &str, message: impl Into<String>) -> CaptureError {
    CaptureError {
        code: code.to_string(),
        message: message.into(),
    }
}

/// One finished microphone capture: an immutable WAV buffer plus the
/// metadata the upload form needs. Replaced wholesale by the next capture.
#[derive(Debug, Clone)]
pub struct RecordedClip {
    pub wav: Arc<Vec<u8>>,
    pub content_type: &'static str,
    pub file_name: &'static str,
    pub duration_seconds: f64,
}

impl RecordedClip {
    pub fn from_samples(samples: &[f32]) -> Self {
        Self {
            wav: Arc::new(wav::encode_mono_pcm16(samples, wav::CLIP_SAMPLE_RATE)),
            content_type: "audio/wav",
            file_name: "audio.wav",
            duration_seconds: wav::duration_seconds(samples.len(), wav::CLIP_SAMPLE_RATE),
        }
    }
}

/// Seam between the capture state machine and the audio host, so the flow
/// is testable without a microphone.
pub trait CaptureBackend: Send + Sync {
    fn begin(&self) -> Result<Box<dyn ActiveCapture>, CaptureError>;
}

/// A live capture. Exclusively holds the input device until finished;
/// dropping it releases the device without producing a clip.
pub trait ActiveCapture: Send {
    fn finish(self: Box<Self>) -> Result<RecordedClip, CaptureError>;
}

/// Captures from the default input device as 16 kHz mono f32 PCM.
pub struct CpalBackend;

impl CaptureBackend for CpalBackend {
    fn begin(&self) -> Result<Box<dyn ActiveCapture>, CaptureError> {
        let capture = CpalCapture::start()?;
        Ok(Box::new(capture))
    }
}

struct CpalCapture {
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<cpal::Stream>,
}

// Safety: the capture lives inside the session object for its whole life
// and is only touched under the session mutex. cpal::Stream is !Send due
// to internal raw pointers, but it is never moved across threads while
// live; it is dropped in place when the capture finishes.
unsafe impl Send for CpalCapture {}

impl CpalCapture {
    fn start() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| err("E_CAPTURE_NO_DEVICE", "no default input device available"))?;

        let config = device
            .default_input_config()
            .map_err(|e| err("E_CAPTURE_CONFIG", format!("input config failed: {e}")))?;

        let sample_rate = config.sample_rate();
        let channels = config.channels() as usize;
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let buffer_clone = buffer.clone();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device
                .build_input_stream(
                    &config.into(),
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        push_chunk(data, sample_rate, channels, &buffer_clone);
                    },
                    |e| crate::safe_eprintln!("capture stream error: {e}"),
                    None,
                )
                .map_err(|e| err("E_CAPTURE_STREAM", format!("build input stream failed: {e}")))?,
            cpal::SampleFormat::I16 => device
                .build_input_stream(
                    &config.into(),
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let floats: Vec<f32> = data
                            .iter()
                            .map(|&s| f32::from(s) / f32::from(i16::MAX))
                            .collect();
                        push_chunk(&floats, sample_rate, channels, &buffer_clone);
                    },
                    |e| crate::safe_eprintln!("capture stream error: {e}"),
                    None,
                )
                .map_err(|e| err("E_CAPTURE_STREAM", format!("build input stream failed: {e}")))?,
            format => {
                return Err(err(
                    "E_CAPTURE_FORMAT",
                    format!("unsupported sample format: {format:?}"),
                ))
            }
        };

        stream
            .play()
            .map_err(|e| err("E_CAPTURE_STREAM", format!("start input stream failed: {e}")))?;

        Ok(Self {
            buffer,
            stream: Some(stream),
        })
    }
}

impl ActiveCapture for CpalCapture {
    fn finish(mut self: Box<Self>) -> Result<RecordedClip, CaptureError> {
        // Drop the stream first so the device is released before encoding.
        self.stream.take();
        let samples = self.buffer.lock().unwrap().clone();
        Ok(RecordedClip::from_samples(&samples))
    }
}

/// Downmix to mono and resample to 16 kHz, appending in arrival order so
/// the finished clip preserves chunk ordering.
fn push_chunk(data: &[f32], sample_rate: u32, channels: usize, buffer: &Arc<Mutex<Vec<f32>>>) {
    if channels == 0 {
        return;
    }
    let mono: Vec<f32> = data
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    if sample_rate == wav::CLIP_SAMPLE_RATE {
        buffer.lock().unwrap().extend_from_slice(&mono);
        return;
    }

    // Nearest-neighbor resampling; good enough for speech upload.
    let ratio = wav::CLIP_SAMPLE_RATE as f64 / f64::from(sample_rate);
    let output_len = (mono.len() as f64 * ratio) as usize;
    let mut resampled = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_idx = (i as f64 / ratio) as usize;
        if src_idx < mono.len() {
            resampled.push(mono[src_idx]);
        }
    }
    buffer.lock().unwrap().extend_from_slice(&resampled);
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{push_chunk, RecordedClip};
    use crate::wav;

    #[test]
    fn clip_metadata_matches_samples() {
        let samples = vec![0.25f32; wav::CLIP_SAMPLE_RATE as usize / 2];
        let clip = RecordedClip::from_samples(&samples);
        assert_eq!(clip.content_type, "audio/wav");
        assert_eq!(clip.file_name, "audio.wav");
        assert!((clip.duration_seconds - 0.5).abs() < 1e-9);
        assert_eq!(clip.wav.len(), 44 + samples.len() * 2);
    }

    #[test]
    fn stereo_input_is_downmixed_to_mono() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        // Two stereo frames at the clip rate: (1.0, 0.0) and (0.5, 0.5).
        push_chunk(&[1.0, 0.0, 0.5, 0.5], wav::CLIP_SAMPLE_RATE, 2, &buffer);
        let got = buffer.lock().unwrap().clone();
        assert_eq!(got, vec![0.5, 0.5]);
    }

    #[test]
    fn higher_rate_input_is_downsampled() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let input = vec![0.1f32; 48_000];
        push_chunk(&input, 48_000, 1, &buffer);
        let got = buffer.lock().unwrap().clone();
        assert_eq!(got.len(), 16_000);
    }

    #[test]
    fn chunks_append_in_arrival_order() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        push_chunk(&[0.1, 0.2], wav::CLIP_SAMPLE_RATE, 1, &buffer);
        push_chunk(&[0.3], wav::CLIP_SAMPLE_RATE, 1, &buffer);
        let got = buffer.lock().unwrap().clone();
        assert_eq!(got, vec![0.1, 0.2, 0.3]);
    }
}
