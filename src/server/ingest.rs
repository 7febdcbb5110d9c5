// ABOUTME: Audio ingestion pipeline
// ABOUTME: Probes a remote source, stream-transcodes it into per-channel artifacts,
// ABOUTME: and signals progressive-ready once both artifacts are playable

use crate::error::Error;
use crate::server::config::ServerConfig;
use crate::server::library::{self, Track, TrackFiles};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::{sleep, Duration};

/// Metadata gathered from the source before transcoding.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Human-readable title; `"Unknown"` when the probe fails
    pub title: String,
    /// Duration in seconds; 0 when the probe fails
    pub duration: f64,
    /// Direct media URL fed to the transcoder
    pub stream_url: String,
}

/// Check that a submitted URL's host is on the acceptance list.
pub fn validate_url(url: &str, allowed_hosts: &[String]) -> crate::Result<()> {
    let host = host_of(url).ok_or(Error::UrlRejected)?;
    let host = host.to_ascii_lowercase();
    if allowed_hosts.iter().any(|h| h == &host) {
        Ok(())
    } else {
        Err(Error::UrlRejected)
    }
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Run the external fetcher with one flag and return the first stdout line.
async fn fetcher_line(bin: &str, flag: &str, url: &str) -> crate::Result<String> {
    let output = Command::new(bin)
        .arg(flag)
        .arg(url)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::FetchFailed(format!("failed to start {bin}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::FetchFailed(truncate(&stderr)));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| Error::FetchFailed(format!("{bin} {flag} produced no output")))
}

/// Probe title, duration, and direct stream URL in parallel.
///
/// Title and duration failures fall back (`"Unknown"` / 0); a missing stream
/// URL aborts the ingestion.
pub async fn probe_source(config: &ServerConfig, url: &str) -> crate::Result<ProbeResult> {
    let bin = &config.fetcher_bin;
    let (title, duration, stream_url) = tokio::join!(
        fetcher_line(bin, "--title", url),
        fetcher_line(bin, "--duration", url),
        fetcher_line(bin, "--stream-url", url),
    );

    let title = title.unwrap_or_else(|e| {
        log::warn!("Title probe failed for {url}: {e}");
        "Unknown".to_string()
    });
    let duration = duration
        .ok()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(ProbeResult {
        title,
        duration,
        stream_url: stream_url?,
    })
}

/// Probe an artifact's duration with the external probe binary.
async fn probe_duration(bin: &str, file: &Path) -> crate::Result<f64> {
    let output = Command::new(bin)
        .arg("-duration")
        .arg(file)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::FetchFailed(format!("failed to start {bin}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::FetchFailed(truncate(&stderr)));
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::FetchFailed(format!("unparseable duration: {e}")))
}

/// Ingest a remote source into a fresh track directory.
///
/// Returns at the progressive-ready barrier: both channel artifacts exist and
/// the smaller one has reached the configured threshold (or the transcoder
/// already finished, for short sources). Transcoding then continues in the
/// background; `metadata.json` is written only on a clean transcoder exit, so
/// failed ingestions stay invisible to the library.
pub async fn ingest(config: &ServerConfig, url: &str, now_ms: f64) -> crate::Result<Track> {
    validate_url(url, &config.allowed_hosts)?;

    let probe = probe_source(config, url).await?;

    let id = library::new_track_id();
    let dir = library::track_dir(&config.audio_root, &id);
    tokio::fs::create_dir_all(&dir).await?;

    let track = Track {
        id: id.clone(),
        title: probe.title,
        duration: probe.duration,
        files: TrackFiles::for_track(&id),
        original_url: url.to_string(),
        created_at: now_ms,
    };

    let left = dir.join("left.mp3");
    let right = dir.join("right.mp3");

    let mut child = spawn_transcoder(config, &probe.stream_url, &left, &right)?;
    let mut stderr = child.stderr.take();

    log::info!("Transcoding {} into track {}", url, id);

    // Progressive-ready barrier: poll artifact sizes until both sides are
    // playable, watching for an early transcoder death.
    loop {
        if let Some(status) = child.try_wait()? {
            if status.success() {
                break;
            }
            let detail = drain_stderr(&mut stderr).await;
            log::warn!("Transcoder died before barrier for track {}: {}", id, detail);
            let _ = tokio::fs::remove_dir_all(&dir).await;
            return Err(Error::TranscodeFailed(detail));
        }

        let smaller = file_size(&left).await.min(file_size(&right).await);
        if smaller >= config.ready_bytes {
            break;
        }

        sleep(Duration::from_millis(config.poll_interval_ms)).await;
    }

    log::info!("Track {} progressive-ready", id);

    tokio::spawn(finish_transcode(
        child,
        stderr,
        track.clone(),
        config.audio_root.clone(),
        config.probe_bin.clone(),
    ));

    Ok(track)
}

fn spawn_transcoder(
    config: &ServerConfig,
    stream_url: &str,
    left: &Path,
    right: &Path,
) -> crate::Result<Child> {
    Command::new(&config.transcoder_bin)
        .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
        .arg("-i")
        .arg(stream_url)
        .args([
            "-filter_complex",
            "[0:a]pan=mono|c0=c0[L];[0:a]pan=mono|c0=c1[R]",
        ])
        .args(["-map", "[L]", "-b:a", "192k"])
        .arg(left)
        .args(["-map", "[R]", "-b:a", "192k"])
        .arg(right)
        .arg("-y")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            Error::TranscodeFailed(format!("failed to start {}: {e}", config.transcoder_bin))
        })
}

/// Completion hook: runs in the background after the barrier has returned.
async fn finish_transcode(
    mut child: Child,
    mut stderr: Option<ChildStderr>,
    mut track: Track,
    audio_root: PathBuf,
    probe_bin: String,
) {
    match child.wait().await {
        Ok(status) if status.success() => {
            if track.duration <= 0.0 {
                let left = library::track_dir(&audio_root, &track.id).join("left.mp3");
                match probe_duration(&probe_bin, &left).await {
                    Ok(d) => track.duration = d,
                    Err(e) => log::warn!("Duration recovery failed for {}: {}", track.id, e),
                }
            }
            match library::write_metadata(&audio_root, &track) {
                Ok(()) => log::info!("Ingestion complete for track {}", track.id),
                Err(e) => log::error!("Failed to write metadata for {}: {}", track.id, e),
            }
        }
        Ok(status) => {
            // Past the barrier a failure only costs the library entry; the
            // metadata-less directory is skipped by enumeration.
            let detail = drain_stderr(&mut stderr).await;
            log::warn!(
                "Transcoder exited {} after barrier for track {}: {}",
                status,
                track.id,
                detail
            );
        }
        Err(e) => log::warn!("Failed to reap transcoder for track {}: {}", track.id, e),
    }
}

async fn drain_stderr(stderr: &mut Option<ChildStderr>) -> String {
    let mut captured = String::new();
    if let Some(s) = stderr.as_mut() {
        let _ = s.read_to_string(&mut captured).await;
    }
    if captured.trim().is_empty() {
        "transcoder produced no diagnostics".to_string()
    } else {
        truncate(&captured)
    }
}

async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

fn truncate(s: &str) -> String {
    let s = s.trim();
    if s.chars().count() > 400 {
        let cut: String = s.chars().take(400).collect();
        format!("{cut}…")
    } else {
        s.to_string()
    }
}
