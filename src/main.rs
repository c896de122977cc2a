//! crop-doctor - 命令行诊断与追问
//!
//! 入口：加载配置、初始化日志，提交一次采集结果并打印诊断，然后逐行读取 stdin 作为追问（/quit 或 EOF 退出，Ctrl+C 销毁页面）。
//!
//! ```bash
//! crop-doctor image --crop Tomato --symptoms "dark lesions on leaves"
//! crop-doctor audio --mock
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use crop_doctor::backend::MockBackend;
use crop_doctor::config::load_config;
use crop_doctor::{observability, Capture, DiagnosisResult, DiagnosisScreen, SessionError};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Default)]
struct CliArgs {
    audio: bool,
    description: Option<String>,
    crop_type: Option<String>,
    symptoms: Option<String>,
    config: Option<PathBuf>,
    mock: bool,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = CliArgs::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "image" => args.audio = false,
            "audio" => args.audio = true,
            "--mock" => args.mock = true,
            "--description" => args.description = Some(iter.next().context("--description needs a value")?),
            "--crop" => args.crop_type = Some(iter.next().context("--crop needs a value")?),
            "--symptoms" => args.symptoms = Some(iter.next().context("--symptoms needs a value")?),
            "--config" => args.config = Some(PathBuf::from(iter.next().context("--config needs a value")?)),
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

fn build_capture(args: &CliArgs) -> Capture {
    let mut capture = if args.audio {
        Capture::audio_description()
    } else {
        Capture::image_upload()
    };
    if let Some(description) = &args.description {
        capture = capture.with_description(description.clone());
    }
    if let Some(crop_type) = &args.crop_type {
        capture = capture.with_crop_type(crop_type.clone());
    }
    if let Some(symptoms) = &args.symptoms {
        capture = capture.with_symptoms(symptoms.clone());
    }
    capture
}

fn print_result(result: &DiagnosisResult) {
    if result.degraded {
        println!("Diagnosis failed (session {})", result.session_id);
    } else {
        println!(
            "Diagnosis: {} (confidence {:.0}%, session {})",
            result.disease.as_deref().unwrap_or("Image Analysis Required"),
            result.confidence * 100.0,
            result.session_id
        );
    }
    println!("{}", result.description);
    let sections = [
        ("Recommendations", &result.recommendations),
        ("Causes", &result.causes),
        ("Symptoms", &result.symptoms_list),
        ("Prevention", &result.prevention),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        println!("{}:", title);
        for item in items {
            println!("  - {}", item);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args()?;
    let cfg = load_config(args.config.clone()).context("Failed to load config")?;
    tracing::info!(
        app = cfg.app.display_name(),
        diagnosis = %cfg.backend.diagnosis_base_url,
        chat = %cfg.backend.chat_base_url,
        mock = args.mock,
        "starting"
    );

    let screen = if args.mock {
        DiagnosisScreen::new(Arc::new(MockBackend::new()), cfg.diagnosis.clone())
    } else {
        DiagnosisScreen::from_config(&cfg).context("Failed to build HTTP backend")?
    };
    let screen = Arc::new(screen);

    let result = screen
        .submit_capture(&build_capture(&args))
        .await
        .context("Diagnosis submission rejected")?;
    print_result(&result);
    println!("\nAsk more questions (/quit to exit):");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                screen.teardown();
                break;
            }
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else { break };
        if line.trim() == "/quit" {
            break;
        }

        let sent = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                screen.teardown();
                break;
            }
            sent = screen.send_message(&line) => sent,
        };
        match sent {
            Ok(reply) => println!("bot> {}", reply.text),
            Err(SessionError::EmptyMessage) => continue,
            Err(err) => {
                tracing::warn!(error = %err, "chat send rejected");
                if matches!(err, SessionError::TornDown) {
                    break;
                }
            }
        }
    }

    screen.teardown();
    Ok(())
}
