// ABOUTME: Scheduled-start audio engine
// ABOUTME: Decodes a fetched artifact and starts looping playback at a precomputed local instant

use crate::error::Error;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Events published by the engine to its registered observer
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A non-looping source ran off the end of its buffer
    Ended,
    /// Diagnostic message (backend resumes, stream errors)
    Log(String),
}

/// Observer callback for [`EngineEvent`]s
pub type EngineObserver = Box<dyn Fn(&EngineEvent) + Send>;

/// A decoded artifact: mono PCM plus its sample rate
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Mono samples in the -1.0..1.0 range
    pub samples: Arc<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Buffer duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Fetch an artifact's bytes over HTTP.
///
/// Blocking; callers inside an async runtime should wrap this in
/// `spawn_blocking`.
pub fn fetch_artifact(url: &str) -> crate::Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| Error::Output(format!("artifact fetch failed: {e}")))?;

    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| Error::Output(format!("artifact read failed: {e}")))?;
    Ok(bytes)
}

/// Decode a fetched byte buffer into mono PCM via symphonia.
///
/// Multi-channel input is averaged down to mono; the per-channel artifacts
/// produced by ingestion are mono already.
pub fn decode_audio(bytes: Vec<u8>, ext_hint: Option<&str>) -> crate::Result<AudioBuffer> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let mss = MediaSourceStream::new(Box::new(std::io::Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(ext_hint.unwrap_or("mp3"));

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Output(format!("unrecognized audio data: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| {
            t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL
                && t.codec_params.sample_rate.is_some()
        })
        .ok_or_else(|| Error::Output("no audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::Output("sample rate not found".to_string()))?;
    let channels = codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1)
        .max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Output(format!("decoder setup failed: {e}")))?;

    let mut mono: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(Error::Output(format!("decode read failed: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::new(decoded.capacity() as u64, *decoded.spec())
                });
                buf.copy_interleaved_ref(decoded);

                for frame in buf.samples().chunks_exact(channels) {
                    mono.push(frame.iter().sum::<f32>() / channels as f32);
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Decode error: {}", e);
                continue;
            }
            Err(e) => return Err(Error::Output(format!("decode failed: {e}"))),
        }
    }

    if mono.is_empty() {
        return Err(Error::Output("decoded no samples".to_string()));
    }

    Ok(AudioBuffer {
        samples: Arc::new(mono),
        sample_rate,
    })
}

/// Lock-free volume control shared with the output callback
struct GainControl {
    bits: AtomicU32,
}

impl GainControl {
    fn new(gain: f32) -> Self {
        Self {
            bits: AtomicU32::new(gain.to_bits()),
        }
    }

    fn set(&self, gain: f32) {
        self.bits
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed)).clamp(0.0, 1.0)
    }
}

/// Pure scheduling and cursor state drained by the output callback.
///
/// `anchor = scheduled_start - start_offset`, so `current_time` is simply
/// wall time past the anchor; with looping enabled it keeps growing past the
/// buffer duration while the cursor wraps.
struct Transport {
    buffer: Option<AudioBuffer>,
    playing: bool,
    looping: bool,
    started: bool,
    start_at: Option<Instant>,
    anchor: Option<Instant>,
    start_offset: f64,
    resume_offset: f64,
    cursor: usize,
    ended: bool,
}

impl Transport {
    fn new() -> Self {
        Self {
            buffer: None,
            playing: false,
            looping: true,
            started: false,
            start_at: None,
            anchor: None,
            start_offset: 0.0,
            resume_offset: 0.0,
            cursor: 0,
            ended: false,
        }
    }

    fn set_buffer(&mut self, buffer: AudioBuffer) {
        self.buffer = Some(buffer);
        self.playing = false;
        self.started = false;
        self.start_at = None;
        self.anchor = None;
        self.start_offset = 0.0;
        self.resume_offset = 0.0;
        self.cursor = 0;
        self.ended = false;
    }

    fn duration(&self) -> f64 {
        self.buffer.as_ref().map(|b| b.duration()).unwrap_or(0.0)
    }

    /// Arm playback from `from_sec` into the buffer at local instant `at`.
    /// A past instant starts on the next callback; the skew is accepted.
    fn schedule(&mut self, from_sec: f64, at: Instant) {
        let from = from_sec.max(0.0);
        self.start_at = Some(at);
        self.anchor = at
            .checked_sub(Duration::from_secs_f64(from))
            .or(Some(at));
        self.start_offset = from;
        self.playing = true;
        self.started = false;
        self.ended = false;
    }

    /// Capture the position and stop, detaching the completion hook.
    fn capture_and_stop(&mut self, now: Instant) -> f64 {
        let mut at = self.current_time(now).max(0.0);
        let duration = self.duration();
        if duration > 0.0 {
            at %= duration;
        }
        self.playing = false;
        self.started = false;
        self.start_at = None;
        self.anchor = None;
        self.ended = false;
        self.resume_offset = at;
        at
    }

    fn current_time(&self, now: Instant) -> f64 {
        if !self.playing {
            return self.resume_offset;
        }
        match self.anchor {
            Some(anchor) if now >= anchor => now.duration_since(anchor).as_secs_f64(),
            Some(anchor) => -(anchor.duration_since(now).as_secs_f64()),
            None => self.resume_offset,
        }
    }

    /// Fill an interleaved output slice; silence until the scheduled instant.
    fn fill(&mut self, out: &mut [f32], channels: usize, gain: f32, now: Instant) {
        out.fill(0.0);

        if !self.playing {
            return;
        }
        let Some(buffer) = self.buffer.as_ref() else {
            return;
        };
        if let Some(start_at) = self.start_at {
            if now < start_at {
                return;
            }
        }

        if !self.started {
            self.started = true;
            let frame = (self.start_offset * buffer.sample_rate as f64) as usize;
            self.cursor = if buffer.samples.is_empty() {
                0
            } else {
                frame % buffer.samples.len()
            };
        }

        let samples = Arc::clone(&buffer.samples);
        let channels = channels.max(1);

        for frame in out.chunks_exact_mut(channels) {
            if self.cursor >= samples.len() {
                if self.looping {
                    self.cursor = 0;
                } else {
                    self.playing = false;
                    self.ended = true;
                    break;
                }
            }
            let value = samples[self.cursor] * gain;
            for slot in frame.iter_mut() {
                *slot = value;
            }
            self.cursor += 1;
        }
    }
}

/// Client-side audio engine with scheduled-start semantics.
///
/// Owns the cpal output stream. The stream callback drains the transport, so
/// all control methods stay non-blocking.
pub struct AudioEngine {
    transport: Arc<Mutex<Transport>>,
    gain: Arc<GainControl>,
    stream: Option<Stream>,
    stream_rate: u32,
    ended_flag: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
    observer: Option<EngineObserver>,
}

impl AudioEngine {
    /// Create an engine with no buffer and no output stream yet
    pub fn new() -> Self {
        Self {
            transport: Arc::new(Mutex::new(Transport::new())),
            gain: Arc::new(GainControl::new(1.0)),
            stream: None,
            stream_rate: 0,
            ended_flag: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(Mutex::new(None)),
            observer: None,
        }
    }

    /// Register the single event observer
    pub fn set_observer(&mut self, observer: EngineObserver) {
        self.observer = Some(observer);
    }

    /// Decode a fetched byte buffer and install it as the active source.
    /// Returns the buffer duration in seconds.
    pub fn load_bytes(&mut self, bytes: Vec<u8>) -> crate::Result<f64> {
        let buffer = decode_audio(bytes, Some("mp3"))?;
        let duration = buffer.duration();
        self.transport.lock().set_buffer(buffer);
        self.emit(EngineEvent::Log(format!(
            "loaded {duration:.1}s of audio"
        )));
        Ok(duration)
    }

    /// Whether a decoded buffer is installed
    pub fn is_ready(&self) -> bool {
        self.transport.lock().buffer.is_some()
    }

    /// Buffer duration in seconds (0 when nothing is loaded)
    pub fn duration(&self) -> f64 {
        self.transport.lock().duration()
    }

    /// Position in seconds; grows past the duration while looping
    pub fn current_time(&self) -> f64 {
        self.transport.lock().current_time(Instant::now())
    }

    /// Set playback volume as a 0.0-1.0 fraction
    pub fn set_volume(&self, volume: f32) {
        self.gain.set(volume);
    }

    /// Current playback volume
    pub fn volume(&self) -> f32 {
        self.gain.get()
    }

    /// Begin looping playback from `from_sec` into the track at local
    /// instant `at`.
    ///
    /// Resumes a suspended backend first; if that fails the call errors with
    /// [`Error::BackendSuspended`] and playback state is untouched. A past
    /// `at` starts immediately and the resulting skew is accepted (the next
    /// broadcast corrects it).
    pub fn play_at(&mut self, from_sec: f64, at: Instant) -> crate::Result<()> {
        if !self.is_ready() {
            return Err(Error::Output("no audio loaded".to_string()));
        }

        self.ensure_stream()?;
        if let Some(stream) = &self.stream {
            stream.play().map_err(|_| Error::BackendSuspended)?;
        }

        self.transport.lock().schedule(from_sec, at);
        Ok(())
    }

    /// Stop playback, capturing the position as the resume offset.
    pub fn pause(&mut self) -> f64 {
        self.transport.lock().capture_and_stop(Instant::now())
    }

    /// Seek to a clamped offset. While playing this restarts immediately
    /// from the new offset (local preview; authoritative seeks come back
    /// through the coordinator).
    pub fn seek_to(&mut self, target_sec: f64) -> crate::Result<()> {
        let duration = self.duration();
        let clamped = target_sec.clamp(0.0, duration.max(0.0));

        let playing = self.transport.lock().playing;
        if playing {
            self.play_at(clamped, Instant::now())
        } else {
            self.transport.lock().resume_offset = clamped;
            Ok(())
        }
    }

    /// Periodic watchdog: while playing, resume a suspended backend and
    /// surface any callback errors. Resumes never re-anchor; drift is left
    /// for the next broadcast to correct.
    pub fn keepalive(&mut self) {
        if let Some(error) = self.last_error.lock().take() {
            log::warn!("Audio stream error: {}", error);
            self.emit(EngineEvent::Log(error));
        }

        if self.ended_flag.swap(false, Ordering::Relaxed) {
            self.emit(EngineEvent::Ended);
        }

        let playing = self.transport.lock().playing;
        if playing {
            if let Some(stream) = &self.stream {
                if stream.play().is_err() {
                    self.emit(EngineEvent::Log("backend resume failed".to_string()));
                }
            }
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    fn ensure_stream(&mut self) -> crate::Result<()> {
        let rate = self
            .transport
            .lock()
            .buffer
            .as_ref()
            .map(|b| b.sample_rate)
            .unwrap_or(44_100);

        if self.stream.is_some() && self.stream_rate == rate {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(Error::BackendSuspended)?;

        let config = StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let transport = Arc::clone(&self.transport);
        let gain = Arc::clone(&self.gain);
        let ended_flag = Arc::clone(&self.ended_flag);
        let error_sink = Arc::clone(&self.last_error);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut transport = transport.lock();
                    transport.fill(data, 2, gain.get(), Instant::now());
                    if transport.ended {
                        transport.ended = false;
                        ended_flag.store(true, Ordering::Relaxed);
                    }
                },
                move |err| {
                    *error_sink.lock() = Some(err.to_string());
                },
                None,
            )
            .map_err(|_| Error::BackendSuspended)?;

        self.stream = Some(stream);
        self.stream_rate = rate;
        Ok(())
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_buffer(len: usize, rate: u32) -> AudioBuffer {
        // A ramp makes cursor positions recognizable in the output.
        let samples: Vec<f32> = (0..len).map(|i| (i + 1) as f32 / len as f32).collect();
        AudioBuffer {
            samples: Arc::new(samples),
            sample_rate: rate,
        }
    }

    #[test]
    fn test_silence_before_scheduled_start() {
        let mut transport = Transport::new();
        transport.set_buffer(test_buffer(100, 100));
        transport.schedule(0.0, Instant::now() + Duration::from_secs(60));

        let mut out = vec![1.0f32; 8];
        transport.fill(&mut out, 2, 1.0, Instant::now());
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(!transport.started);
    }

    #[test]
    fn test_fill_starts_at_offset_and_applies_gain() {
        let mut transport = Transport::new();
        transport.set_buffer(test_buffer(100, 100));
        // 0.5s at 100Hz = frame 50; samples are (i+1)/100.
        transport.schedule(0.5, Instant::now());

        let mut out = vec![0.0f32; 4];
        transport.fill(&mut out, 2, 0.5, Instant::now());

        assert!((out[0] - 0.51 * 0.5).abs() < 1e-6);
        assert_eq!(out[0], out[1], "mono value duplicated across channels");
        assert!((out[2] - 0.52 * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_looping_wraps_cursor() {
        let mut transport = Transport::new();
        transport.set_buffer(test_buffer(4, 100));
        transport.schedule(0.0, Instant::now());

        let mut out = vec![0.0f32; 12]; // 6 frames from a 4-frame buffer
        transport.fill(&mut out, 2, 1.0, Instant::now());

        // Frames 4 and 5 wrap back to the buffer start.
        assert!((out[8] - 0.25).abs() < 1e-6);
        assert!((out[10] - 0.5).abs() < 1e-6);
        assert!(transport.playing);
    }

    #[test]
    fn test_non_looping_source_ends() {
        let mut transport = Transport::new();
        transport.set_buffer(test_buffer(4, 100));
        transport.looping = false;
        transport.schedule(0.0, Instant::now());

        let mut out = vec![0.0f32; 12];
        transport.fill(&mut out, 2, 1.0, Instant::now());

        assert!(!transport.playing);
        assert!(transport.ended);
        assert_eq!(out[8], 0.0, "tail stays silent");
    }

    #[test]
    fn test_current_time_tracks_anchor() {
        let mut transport = Transport::new();
        transport.set_buffer(test_buffer(48_000, 48_000));

        let at = Instant::now();
        transport.schedule(0.25, at);

        // 100ms after the scheduled start, position is offset + elapsed.
        let t = transport.current_time(at + Duration::from_millis(100));
        assert!((t - 0.35).abs() < 1e-6);
    }

    #[test]
    fn test_pause_captures_resume_offset() {
        let mut transport = Transport::new();
        transport.set_buffer(test_buffer(48_000, 48_000)); // 1s buffer

        let at = Instant::now();
        transport.schedule(0.0, at);
        let captured = transport.capture_and_stop(at + Duration::from_millis(2500));

        // 2.5s into a looping 1s buffer folds to 0.5s.
        assert!((captured - 0.5).abs() < 1e-3);
        assert!(!transport.playing);
        assert!((transport.current_time(Instant::now()) - captured).abs() < 1e-9);
    }

    #[test]
    fn test_past_instant_starts_immediately() {
        let mut transport = Transport::new();
        transport.set_buffer(test_buffer(100, 100));
        transport.schedule(0.0, Instant::now() - Duration::from_millis(50));

        let mut out = vec![0.0f32; 4];
        transport.fill(&mut out, 2, 1.0, Instant::now());
        assert!(out[0] > 0.0, "audio flows despite the missed instant");
    }

    #[test]
    fn test_gain_control_clamps() {
        let gain = GainControl::new(1.0);
        gain.set(1.5);
        assert_eq!(gain.get(), 1.0);
        gain.set(-0.5);
        assert_eq!(gain.get(), 0.0);
        gain.set(0.25);
        assert_eq!(gain.get(), 0.25);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_audio(b"definitely not audio".to_vec(), Some("mp3")).is_err());
    }
}
