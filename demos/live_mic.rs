// Live Microphone Example: Real-time speech-to-text streaming
//
// This example demonstrates the complete live pipeline:
// 1. CPAL captures microphone audio (16kHz mono PCM)
// 2. 100ms chunks are streamed to the transcription service over WebSocket
// 3. Interim results arrive while you speak and are replaced in place
// 4. Final results are committed to the running transcript
//
// IMPORTANT: Requires microphone permission on macOS:
// - System Settings → Privacy & Security → Microphone → Add Terminal/IDE
//
// Prerequisites:
// - A transcription API key: export STREAMSCRIBE_API_KEY=your-key-here
//
// Usage: cargo run --example live_mic

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use streamscribe::{
    CaptureSource, Config, MicrophoneDevice, TranscriptionSession, DEFAULT_OPEN_TIMEOUT,
};
use tokio::time::timeout;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("🎙️  Starting live microphone transcription");

    // 1. Load configuration (env overrides included)
    let config = Config::load(None)?;

    // 2. Create the session and connect
    let session = TranscriptionSession::new(config.session_config());
    session.connect().await?;
    info!("✅ Session created: {}", session.session_id());

    // 3. Wait for the socket to open before capturing
    session.wait_until_open(DEFAULT_OPEN_TIMEOUT).await?;
    info!("✅ Connected to transcription service");

    // 4. Spawn transcript display task
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    let mut transcript_rx = session.subscribe_transcript();

    let display_handle = tokio::spawn(async move {
        info!("📝 Listening for transcripts...");

        loop {
            match timeout(Duration::from_millis(500), transcript_rx.changed()).await {
                Ok(Ok(())) => {
                    let text = transcript_rx.borrow_and_update().clone();
                    if !text.is_empty() {
                        info!("📝 \"{}\"", text);
                    }
                }
                Ok(Err(_)) => {
                    info!("⏹️  Transcript stream closed");
                    break;
                }
                Err(_) => {
                    // Timeout - check if we should stop
                    if stop_flag_clone.load(Ordering::Relaxed) {
                        break;
                    }
                }
            }
        }
    });

    // 5. Acquire the microphone up front so the permission prompt shows
    // before recording starts
    let mut source =
        CaptureSource::with_constraints(Box::new(MicrophoneDevice::new()), config.capture_constraints());
    source.acquire().await?;

    info!("");
    info!("🎤 Capturing for 15 seconds. Speak into your microphone!");
    info!("");

    let mut chunks = source.start().await?;
    let start_time = tokio::time::Instant::now();
    let recording_duration = Duration::from_secs(15);

    // 6. Forward chunks to the session
    let mut chunk_count = 0usize;
    loop {
        if start_time.elapsed() >= recording_duration {
            info!("⏰ Recording duration reached");
            break;
        }

        match timeout(Duration::from_millis(100), chunks.recv()).await {
            Ok(Some(chunk)) => {
                session.send_audio(chunk);
                chunk_count += 1;

                if chunk_count % 50 == 0 {
                    info!(
                        "📤 Forwarded {} chunks ({:.1}s elapsed)",
                        chunk_count,
                        start_time.elapsed().as_secs_f32()
                    );
                }
            }
            Ok(None) => {
                // Channel closed - capture stopped
                break;
            }
            Err(_) => {
                // Timeout - keep waiting for chunks
            }
        }
    }

    // 7. Stop capturing
    source.stop();
    if let Some(warning) = source.last_error() {
        info!("⚠️  Capture warning: {}", warning);
    }
    info!("⏹️  Microphone capture stopped");

    // 8. Give the service a moment to flush final results
    info!("⏳ Waiting for final transcripts (3s)...");
    tokio::time::sleep(Duration::from_secs(3)).await;

    // 9. Disconnect and report
    session.disconnect().await;
    stop_flag.store(true, Ordering::Relaxed);

    match timeout(Duration::from_secs(2), display_handle).await {
        Ok(Ok(())) => info!("✅ Transcript display completed"),
        Ok(Err(e)) => info!("❌ Transcript display error: {}", e),
        Err(_) => info!("⏱️  Transcript display timeout"),
    }

    let stats = session.get_stats();
    info!("");
    info!("🏁 Live transcription complete!");
    info!("📊 Chunks forwarded: {}", stats.chunks_forwarded);
    info!("📊 Events processed: {}", stats.events_processed);
    info!("📊 Finals committed: {}", stats.finals_committed);
    info!("📜 Transcript: \"{}\"", session.transcript());

    Ok(())
}
