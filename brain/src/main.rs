use brain::{Brain, BrainConfig, BrainError, RunRequest};
use router::Tier;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("brain error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), BrainError> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if matches!(args.first().map(String::as_str), Some("--help") | Some("-h")) {
        print_usage();
        return Ok(());
    }
    if matches!(args.first().map(String::as_str), Some("run")) {
        args.remove(0);
    }

    let mut config_path: Option<PathBuf> = None;
    let mut prompt: Option<String> = None;
    let mut conversation_id: Option<String> = None;
    let mut user_id: Option<String> = None;
    let mut use_agent = false;
    let mut allow_paid = false;
    let mut force_tier: Option<Tier> = None;

    let mut remaining = args;
    while let Some(flag) = remaining.first().cloned() {
        remaining.remove(0);
        match flag.as_str() {
            "--config" => config_path = Some(PathBuf::from(take_arg("--config", &mut remaining)?)),
            "--prompt" => prompt = Some(take_arg("--prompt", &mut remaining)?),
            "--conversation" => conversation_id = Some(take_arg("--conversation", &mut remaining)?),
            "--user" => user_id = Some(take_arg("--user", &mut remaining)?),
            "--agent" => use_agent = true,
            "--allow-paid" => allow_paid = true,
            "--tier" => force_tier = Some(parse_tier(&take_arg("--tier", &mut remaining)?)?),
            other => return Err(BrainError::Config(format!("unknown flag: {other}"))),
        }
    }

    let config = match config_path {
        Some(path) => BrainConfig::load(Some(&path))?,
        None => {
            let default_path = PathBuf::from("brain.json");
            if default_path.exists() {
                BrainConfig::load(Some(&default_path))?
            } else {
                BrainConfig::load(None)?
            }
        }
    };

    let user_message = match prompt {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            let trimmed = buffer.trim().to_string();
            if trimmed.is_empty() {
                return Err(BrainError::Config(
                    "missing prompt: pass --prompt or pipe stdin".to_string(),
                ));
            }
            trimmed
        }
    };

    let conversation_id = conversation_id.unwrap_or_else(|| "cli".to_string());
    let request_id = uuid_ish();

    let mut request = RunRequest::new(conversation_id, request_id, user_message);
    request.user_id = user_id;
    request.use_agent = use_agent;
    request.allow_paid = allow_paid;
    request.force_tier = force_tier;

    let brain = Brain::new(config, HashMap::new())?;
    let response = brain.run(request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn parse_tier(text: &str) -> Result<Tier, BrainError> {
    match text.to_ascii_lowercase().as_str() {
        "local" => Ok(Tier::Local),
        "web" => Ok(Tier::Web),
        "frontier" => Ok(Tier::Frontier),
        other => Err(BrainError::Config(format!("unknown tier: {other}"))),
    }
}

fn uuid_ish() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("req-{nanos:x}")
}

fn take_arg(flag: &str, remaining: &mut Vec<String>) -> Result<String, BrainError> {
    if remaining.is_empty() {
        return Err(BrainError::Config(format!("missing value for {flag}")));
    }
    Ok(remaining.remove(0))
}

fn print_usage() {
    println!(
        "brain [run] [--config brain.json] [--prompt TEXT] [--conversation ID] [--user ID] \
[--agent] [--allow-paid] [--tier local|web|frontier]"
    );
}
