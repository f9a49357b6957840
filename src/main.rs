// Terminal driver for the interview flow

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use interview_coach_lib::capture::{MediaDevices, SyntheticDevices};
use interview_coach_lib::commands::{self, InterviewState};
use interview_coach_lib::config::InterviewConfig;
use interview_coach_lib::interview::{AnswerProgress, FlowState, Recovery, SessionRequest};
use interview_coach_lib::utils::ErrorResponse;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "interview-coach")]
#[command(about = "Practice interviews with recorded answers and video analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Interview server base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token for the interview server
    #[arg(long, global = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run an interactive interview
    Run {
        #[arg(long, conflicts_with = "job_posting_id")]
        job_posting_url: Option<String>,
        #[arg(long)]
        job_posting_id: Option<String>,
        #[arg(long, value_enum, default_value_t = DeviceBackend::Synthetic)]
        device: DeviceBackend,
    },
    /// Poll the analysis of an uploaded video
    Poll {
        #[arg(long)]
        video_id: String,
    },
    /// Print the audio URL of a question
    Tts {
        #[arg(long)]
        question_id: String,
    },
    /// Print the progress of a session
    Status {
        #[arg(long)]
        session_id: String,
    },
    /// List capture devices
    Devices {
        #[arg(long, value_enum, default_value_t = DeviceBackend::Synthetic)]
        device: DeviceBackend,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DeviceBackend {
    Synthetic,
    Microphone,
}

fn open_devices(backend: DeviceBackend) -> Result<Arc<dyn MediaDevices>> {
    match backend {
        DeviceBackend::Synthetic => Ok(Arc::new(SyntheticDevices::new())),
        #[cfg(feature = "microphone")]
        DeviceBackend::Microphone => Ok(Arc::new(interview_coach_lib::capture::MicrophoneDevices::new())),
        #[cfg(not(feature = "microphone"))]
        DeviceBackend::Microphone => bail!("built without the `microphone` feature"),
    }
}

fn command_error(err: ErrorResponse) -> anyhow::Error {
    anyhow!("{} [{}]", err.message, err.code)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    interview_coach_lib::init_tracing();
    let cli = Cli::parse();

    let mut config = InterviewConfig::load(cli.config.as_deref()).map_err(|e| anyhow!("{}", e))?;
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }
    if let Some(token) = cli.token {
        config.api.bearer_token = Some(token);
    }
    config.validate().map_err(|e| anyhow!("{}", e))?;

    tracing::info!("Interview Coach v{} using {}", env!("CARGO_PKG_VERSION"), config.api.base_url);

    let device = match &cli.command {
        Command::Run { device, .. } | Command::Devices { device } => *device,
        _ => DeviceBackend::Synthetic,
    };
    let state = InterviewState::with_http(config, open_devices(device)?).map_err(command_error)?;

    match cli.command {
        Command::Run {
            job_posting_url,
            job_posting_id,
            ..
        } => {
            let request = match (job_posting_url, job_posting_id) {
                (Some(url), _) => SessionRequest::from_url(url),
                (None, Some(id)) => SessionRequest::from_job_posting(id),
                (None, None) => SessionRequest::default(),
            };
            run_interview(&state, request).await
        }
        Command::Poll { video_id } => {
            let cancel = CancellationToken::new();
            let watcher = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    watcher.cancel();
                }
            });
            let result = commands::interview::poll_video_analysis(&state, &video_id, &cancel)
                .await
                .map_err(command_error)?;
            print_json(&result)
        }
        Command::Tts { question_id } => {
            let url = commands::interview::get_question_audio_by_id(&state, &question_id)
                .await
                .map_err(command_error)?;
            println!("{}", url);
            Ok(())
        }
        Command::Status { session_id } => {
            let status = commands::interview::get_session_status(&state, &session_id)
                .await
                .map_err(command_error)?;
            print_json(&status)
        }
        Command::Devices { .. } => {
            let devices = commands::devices::list_devices(&state).await.map_err(command_error)?;
            print_json(&devices)?;
            println!(
                "permission: {:?}",
                commands::devices::check_permission(&state).await
            );
            Ok(())
        }
    }
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    let line = lines.next_line().await.context("Failed to read from stdin")?;
    Ok(line.map(|l| l.trim().to_string()))
}

fn print_question(state: &FlowState) {
    if let FlowState::Interviewing {
        question_index,
        questions,
        ..
    } = state
    {
        if let Some(question) = questions.get(*question_index) {
            println!("\nQuestion {}: {}", question_index + 1, question.text);
            println!("Press Enter to start answering, q to finish the interview.");
        }
    }
}

async fn run_interview(state: &InterviewState, request: SessionRequest) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let started = commands::interview::start_interview(state, request)
        .await
        .map_err(command_error)?;
    print_question(&started);

    loop {
        let current = commands::interview::get_flow_state(state);
        match &current {
            FlowState::Interviewing { .. } => {}
            FlowState::Error {
                recovery: Recovery::ResumeInterview { .. },
                message,
                ..
            } => {
                println!("{}\nPress Enter to try again, q to quit.", message);
                match read_line(&mut lines).await?.as_deref() {
                    Some("q") | None => break,
                    _ => {
                        let resumed = commands::interview::recover(state).await.map_err(command_error)?;
                        print_question(&resumed);
                        continue;
                    }
                }
            }
            _ => break,
        }

        let line = tokio::select! {
            line = read_line(&mut lines) => line?,
            _ = tokio::signal::ctrl_c() => {
                commands::interview::abandon_interview(state).await.map_err(command_error)?;
                bail!("interview abandoned");
            }
        };

        let recording = matches!(current, FlowState::Interviewing { is_recording: true, .. });
        match line.as_deref() {
            None | Some("q") => {
                commands::interview::end_interview(state).await.map_err(command_error)?;
                break;
            }
            Some(_) if !recording && !state.controller.has_retained_answer() => {
                match commands::interview::begin_answer(state).await {
                    Ok(_) => println!("Recording... press Enter when you are done."),
                    Err(err) => eprintln!("{}", err.message),
                }
            }
            Some(_) => match commands::interview::end_answer(state).await {
                Ok(AnswerProgress::NextQuestion { .. }) => {
                    print_question(&commands::interview::get_flow_state(state));
                }
                Ok(AnswerProgress::Finished) => break,
                Err(err) if err.retryable => {
                    eprintln!("{}\nPress Enter to send the answer again.", err.message);
                }
                Err(err) => eprintln!("{}", err.message),
            },
        }
    }

    println!("Analyzing your interview...");
    let mut outcome = commands::interview::wait_for_results(state).await;
    while let FlowState::Error {
        recovery: Recovery::RetryAnalysis { .. },
        message,
        ..
    } = &outcome
    {
        println!("{}\nPress Enter to retry the analysis, q to quit.", message);
        match read_line(&mut lines).await?.as_deref() {
            Some("q") | None => break,
            _ => {
                if let Err(err) = commands::interview::retry_analysis(state).await {
                    eprintln!("{}", err.message);
                }
                outcome = commands::interview::wait_for_results(state).await;
            }
        }
    }

    print_json(&outcome)?;
    print_json(&commands::interview::get_answer_receipts(state))?;
    match outcome {
        FlowState::Complete { .. } => Ok(()),
        FlowState::Waiting => bail!("interview ended before any analysis"),
        _ => bail!("interview did not complete"),
    }
}
