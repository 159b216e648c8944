use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hark::activation::ActivationLoop;
use hark::api::BackendClient;
use hark::config::Config;
use hark::dispatch::{CommandDispatcher, KeywordSets};
use hark::status::StatusLock;
use hark::supervisor::{RestartPolicy, Supervisor};
use hark::voice::cues::CuePlayer;
use hark::voice::detector::{EnergyGateDetector, WakePhraseSet};
use hark::voice::playback::{AudioPlayback, TTS_SAMPLE_RATE};
use hark::voice::recognizer::WhisperRecognizer;
use hark::voice::tts::{HttpSpeaker, Speaker};
use hark::voice::volume::SystemVolume;
use hark::voice::capture::{FrameInput, MicrophoneInput};

/// Hark - Voice-activated client for a self-hosted command API
#[derive(Parser)]
#[command(name = "hark", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the listener directly, without supervision. The supervisor
    /// spawns this as its child.
    #[command(hide = true)]
    Listen,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,hark=info",
        1 => "info,hark=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Listen => listen().await,
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
        };
    }

    supervise(cli.verbose).await
}

/// Run the supervisor, respawning `hark listen` children
async fn supervise(verbose: u8) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::info!(
        phrases = ?config.wake_phrases,
        server = %config.server_url,
        "starting supervisor"
    );

    let status = StatusLock::open(config.status_file())?;
    let policy = RestartPolicy {
        restart_interval: config.restart_interval,
        max_start_failures: config.max_start_failures,
    };

    let mut args: Vec<String> = std::iter::repeat_n("-v".to_string(), usize::from(verbose)).collect();
    args.push("listen".to_string());

    let mut supervisor = Supervisor::new(std::env::current_exe()?, args, status, policy);
    supervisor.run().await?;

    Ok(())
}

/// Run one listener child until it stops or parks for replacement
#[allow(clippy::future_not_send)]
async fn listen() -> anyhow::Result<()> {
    let config = Config::load()?;

    let phrases = WakePhraseSet::new(config.wake_phrases.clone(), config.sensitivities.clone())?;
    let detector = EnergyGateDetector::new(phrases);
    let input = MicrophoneInput::new(config.microphone_index);
    let recognizer = WhisperRecognizer::new(
        config.stt.clone(),
        config.microphone_index,
        config.listener_timeout,
        config.listener_phrase_limit,
    );

    let client = BackendClient::new(
        config.server_url.clone(),
        config.server_token.clone(),
        config.speech_response_file(),
    )?;
    let sets = KeywordSets::load(&client).await;

    let cues = CuePlayer::new(config.indicators_dir.clone());
    let speaker = HttpSpeaker::new(config.tts.clone());
    let dispatcher = CommandDispatcher::new(
        client,
        sets,
        cues.clone(),
        speaker,
        SystemVolume,
        config.volume,
        config.marker_file(),
        config.request_timeout,
        config.speech_timeout,
        config.native_audio,
    );

    let status = StatusLock::open(config.status_file())?;

    let mut activation = ActivationLoop::new(
        detector,
        input,
        recognizer,
        dispatcher,
        status,
        cues,
        config.wake_phrases,
    );
    activation.run().await?;

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let config = Config::load()?;
    let mut input = MicrophoneInput::new(config.microphone_index);
    input.open()?;

    let deadline = std::time::Instant::now() + Duration::from_secs(duration);
    let mut second = 0_u64;
    let mut samples: Vec<i16> = Vec::new();

    while std::time::Instant::now() < deadline {
        samples.extend(input.next_frame().await?);

        if samples.len() >= 16_000 {
            second += 1;
            let energy = calculate_rms(&samples);
            let peak = samples
                .iter()
                .map(|&s| f32::from(s).abs() / 32768.0)
                .fold(0.0_f32, f32::max);

            // Visual meter
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let meter_len = (energy * 100.0).min(50.0) as usize;
            let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

            println!("[{second:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]");
            samples.clear();
        }
    }

    input.close();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let v = f32::from(s) / 32768.0;
            v * v
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new(TTS_SAMPLE_RATE)?;

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (TTS_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / TTS_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {TTS_SAMPLE_RATE} Hz...", samples.len());

    playback.play(samples).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Test TTS output
#[allow(clippy::future_not_send)]
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let mut speaker = HttpSpeaker::new(config.tts);

    println!("Synthesizing and playing...");
    speaker.speak(text).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
