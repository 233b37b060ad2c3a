use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use dotenvy::dotenv;
use tracing::{error, info, warn};

mod config;
mod llm;
mod state;
mod studio;
mod utils;

use config::CONFIG;
use llm::{GeminiClient, ImageGenerator};
use state::SessionState;
use studio::catalog::{find_model, find_pose, list_models, list_poses};
use studio::export::export_result;
use studio::{AspectRatio, GenerationOutcome, GenerationResult, Studio};
use utils::logging::init_logging;

#[derive(Debug, Clone, PartialEq)]
struct GenerateArgs {
    image: PathBuf,
    model_id: Option<String>,
    pose_id: Option<String>,
    ratio: AspectRatio,
    resize_ratios: Vec<AspectRatio>,
    out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Models,
    Poses,
    Generate(GenerateArgs),
    Help,
}

fn usage() -> &'static str {
    "Usage:\n  pera-studio models\n  pera-studio poses\n  pera-studio generate --image <path> [--model <id>] [--pose <id>] [--ratio <3:4|9:16|1:1|4:3|16:9>] [--resize <ratio>]... [--out <dir>]"
}

fn parse_ratio(value: &str) -> Result<AspectRatio> {
    value.parse::<AspectRatio>().map_err(|err| anyhow!(err))
}

fn take_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_generate_args(args: &[String]) -> Result<GenerateArgs> {
    let mut image: Option<PathBuf> = None;
    let mut model_id = None;
    let mut pose_id = None;
    let mut ratio = AspectRatio::default();
    let mut resize_ratios = Vec::new();
    let mut out_dir = None;

    let mut index = 0;
    while index < args.len() {
        let flag = args[index].as_str();
        match flag {
            "--image" => image = Some(PathBuf::from(take_value(args, &mut index, flag)?)),
            "--model" => model_id = Some(take_value(args, &mut index, flag)?.to_string()),
            "--pose" => pose_id = Some(take_value(args, &mut index, flag)?.to_string()),
            "--ratio" => ratio = parse_ratio(take_value(args, &mut index, flag)?)?,
            "--resize" => resize_ratios.push(parse_ratio(take_value(args, &mut index, flag)?)?),
            "--out" => out_dir = Some(PathBuf::from(take_value(args, &mut index, flag)?)),
            other => {
                return Err(anyhow!(
                    "Unknown generate argument: {other}\n{}",
                    usage()
                ));
            }
        }
        index += 1;
    }

    let image = image.ok_or_else(|| anyhow!("--image is required\n{}", usage()))?;
    Ok(GenerateArgs {
        image,
        model_id,
        pose_id,
        ratio,
        resize_ratios,
        out_dir,
    })
}

fn parse_command(args: &[String]) -> Result<Command> {
    match args.get(1).map(|value| value.as_str()) {
        Some("models") => Ok(Command::Models),
        Some("poses") => Ok(Command::Poses),
        Some("generate") => Ok(Command::Generate(parse_generate_args(&args[2..])?)),
        None | Some("help") | Some("--help") | Some("-h") => Ok(Command::Help),
        Some(other) => Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }
}

fn print_models() {
    for model in list_models() {
        println!("{:<20} {:<18} {}", model.id, model.label, model.description);
    }
}

fn print_poses() {
    for pose in list_poses() {
        println!("{:<22} {}", pose.id, pose.label);
    }
}

fn print_result_card(result: &GenerationResult, is_latest: bool) {
    let marker = if is_latest { "*" } else { " " };
    println!(
        "{marker} Çekim No: #{} | {} | {} | {}",
        result.short_id(),
        result.ratio.display_label(),
        result.prompt,
        result.timestamp.format("%H:%M:%S %d.%m.%Y")
    );
}

fn print_session(state: &SessionState) {
    if let Some(latest) = state.latest_result() {
        print_result_card(latest, true);
    }
    let archived = state.archived_results();
    if !archived.is_empty() {
        println!("Arşivlenen Çekimler:");
        for result in archived {
            print_result_card(result, false);
        }
    }
    if let Some(message) = &state.last_error {
        println!("! {message}");
    }
}

/// Ctrl-C drops the in-flight request.
async fn cancellable<F: Future<Output = GenerationOutcome>>(request: F) -> Result<GenerationOutcome> {
    tokio::select! {
        outcome = request => Ok(outcome),
        _ = tokio::signal::ctrl_c() => {
            warn!("Generation cancelled by user");
            Err(anyhow!("Cancelled"))
        }
    }
}

async fn export_shot(result: &GenerationResult, out_dir: &Path) -> Result<()> {
    let path = export_result(result, out_dir, &CONFIG.export_prefix).await?;
    println!("Saved {}", path.display());
    Ok(())
}

async fn run_generate<G: ImageGenerator>(studio: &Studio<G>, args: GenerateArgs) -> Result<()> {
    studio
        .upload_file(&args.image)
        .await
        .with_context(|| format!("Could not load garment image {}", args.image.display()))?;

    if let Some(model_id) = &args.model_id {
        if find_model(model_id).is_none() {
            warn!("Model id '{}' is not in the catalog", model_id);
        }
        studio.select_model(model_id);
    }
    if let Some(pose_id) = &args.pose_id {
        if find_pose(pose_id).is_none() {
            warn!("Pose id '{}' is not in the catalog", pose_id);
        }
        studio.select_pose(pose_id);
    }

    let out_dir = args.out_dir.clone().unwrap_or_else(|| CONFIG.export_dir.clone());

    let base = match cancellable(studio.request_generation(args.ratio, None)).await? {
        GenerationOutcome::Completed(result) => result,
        GenerationOutcome::Failed(message) => bail!(message),
        GenerationOutcome::Skipped => bail!("No garment image to generate from"),
        GenerationOutcome::Busy => bail!("A generation is already running"),
    };
    export_shot(&base, &out_dir).await?;

    for ratio in &args.resize_ratios {
        match cancellable(studio.request_resize(&base, *ratio)).await? {
            GenerationOutcome::Completed(result) => export_shot(&result, &out_dir).await?,
            GenerationOutcome::Failed(message) => {
                error!("Resize to {} failed: {}", ratio, message)
            }
            GenerationOutcome::Skipped | GenerationOutcome::Busy => {
                warn!("Resize to {} was not started", ratio)
            }
        }
    }

    print_session(&studio.snapshot());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _guards = init_logging(&CONFIG.log_level, &CONFIG.log_dir);

    let args: Vec<String> = std::env::args().collect();
    match parse_command(&args)? {
        Command::Help => println!("{}", usage()),
        Command::Models => print_models(),
        Command::Poses => print_poses(),
        Command::Generate(generate_args) => {
            let client = GeminiClient::from_config(&CONFIG)?;
            info!("Starting studio session with image model {}", client.model());
            let studio = Studio::new(client).with_upload_limit(CONFIG.max_upload_bytes);
            run_generate(&studio, generate_args).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parses_generate_with_resizes() {
        let command = parse_command(&argv(&[
            "pera-studio",
            "generate",
            "--image",
            "shirt.png",
            "--model",
            "minimalist-neutral",
            "--pose",
            "static-classic",
            "--resize",
            "9:16",
            "--resize",
            "1:1",
            "--out",
            "shots",
        ]))
        .unwrap();

        assert_eq!(
            command,
            Command::Generate(GenerateArgs {
                image: PathBuf::from("shirt.png"),
                model_id: Some("minimalist-neutral".to_string()),
                pose_id: Some("static-classic".to_string()),
                ratio: AspectRatio::Portrait3x4,
                resize_ratios: vec![AspectRatio::Story9x16, AspectRatio::Square1x1],
                out_dir: Some(PathBuf::from("shots")),
            })
        );
    }

    #[test]
    fn generate_requires_image_and_valid_ratio() {
        assert!(parse_command(&argv(&["pera-studio", "generate"])).is_err());
        assert!(parse_command(&argv(&[
            "pera-studio",
            "generate",
            "--image",
            "a.png",
            "--ratio",
            "2:3"
        ]))
        .is_err());
        assert!(parse_command(&argv(&["pera-studio", "generate", "--image"])).is_err());
    }

    #[test]
    fn bare_invocation_prints_help() {
        assert_eq!(parse_command(&argv(&["pera-studio"])).unwrap(), Command::Help);
        assert!(parse_command(&argv(&["pera-studio", "publish"])).is_err());
    }
}
