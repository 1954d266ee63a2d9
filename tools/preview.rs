/// Preview: runs a stored template without a model and prints what happened.
///
/// Usage: preview --templates <path> (--id <id> | --name <name> --category <category>)
///                [--knowledge <file>] [--set key=value]... [--reply <text>]... [--json]
///
/// Without `--reply`, every block is answered by echoing its last message.
/// Each `--reply` supplies the next block's answer instead.

use anyhow::{bail, Context};
use prompt_chain::core::generation::{EchoGenerator, Generator, ScriptedGenerator};
use prompt_chain::schema::template::TemplateRef;
use prompt_chain::{GenerationRequest, PromptEngine};
use std::sync::Arc;

struct Options {
    templates: String,
    id: Option<String>,
    name: Option<String>,
    category: Option<String>,
    knowledge: Option<String>,
    values: Vec<(String, String)>,
    replies: Vec<String>,
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args[0] == "--help" || args[0] == "-h" {
        print_usage();
        return Ok(());
    }
    let options = parse_args(&args)?;

    let template_ref = match (&options.id, &options.name, &options.category) {
        (Some(id), None, _) => TemplateRef::id(id.as_str()),
        (None, Some(name), Some(category)) => TemplateRef::name(name.as_str(), category.as_str()),
        _ => bail!("pass either --id, or --name together with --category"),
    };

    let generator: Arc<dyn Generator> = if options.replies.is_empty() {
        Arc::new(EchoGenerator::new())
    } else {
        Arc::new(ScriptedGenerator::new(options.replies.clone()))
    };

    let mut builder = PromptEngine::builder()
        .templates_file(&options.templates)
        .with_generator(generator);
    if let Some(ref path) = options.knowledge {
        builder = builder.knowledge_file(path);
    }
    let engine = builder
        .build()
        .with_context(|| format!("failed to load '{}'", options.templates))?;

    let mut request = GenerationRequest::new(template_ref);
    for (key, value) in &options.values {
        request = request.with_placeholder(key.as_str(), value.as_str());
    }

    let result = engine.text_generation_by_prompt_template(&request).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("=== Blocks ===");
    for (index, block) in result.trace.iter().enumerate() {
        let forgotten = if block.forget { " (forgotten)" } else { "" };
        println!(
            "\n[{}] {} as {}{}",
            index + 1,
            block.output_var_name,
            block.output_type.as_str(),
            forgotten
        );
        for message in &block.messages {
            println!("  {}: {}", message.role.as_str(), message.content);
        }
    }

    println!("\n=== Transcript ===");
    for message in &result.messages {
        println!("{}: {}", message.role.as_str(), message.content);
    }

    println!("\n=== Responses ===");
    let mut names: Vec<&String> = result.responses.keys().collect();
    names.sort();
    for name in names {
        println!("{} = {}", name, result.responses[name].as_prompt_text());
    }
    println!("\nlast output: {}", result.last_output_var_name);

    Ok(())
}

fn parse_args(args: &[String]) -> anyhow::Result<Options> {
    let mut options = Options {
        templates: String::new(),
        id: None,
        name: None,
        category: None,
        knowledge: None,
        values: Vec::new(),
        replies: Vec::new(),
        json: false,
    };

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "--json" {
            options.json = true;
            i += 1;
            continue;
        }
        let Some(value) = args.get(i + 1).cloned() else {
            bail!("missing value for {}", flag);
        };
        match flag {
            "--templates" => options.templates = value,
            "--id" => options.id = Some(value),
            "--name" => options.name = Some(value),
            "--category" => options.category = Some(value),
            "--knowledge" => options.knowledge = Some(value),
            "--reply" => options.replies.push(value),
            "--set" => {
                let (key, val) = value
                    .split_once('=')
                    .with_context(|| format!("--set expects key=value, got '{}'", value))?;
                options.values.push((key.to_string(), val.to_string()));
            }
            other => bail!("unknown argument: {}", other),
        }
        i += 2;
    }

    if options.templates.is_empty() {
        bail!("--templates is required");
    }
    Ok(options)
}

fn print_usage() {
    println!("Usage: preview --templates <path> (--id <id> | --name <name> --category <category>)");
    println!("               [--knowledge <file>] [--set key=value]... [--reply <text>]... [--json]");
    println!();
    println!("Without --reply every block is answered by echoing its last message.");
    println!("Set RUST_LOG=prompt_chain=debug to trace each block.");
}
