/// Template Linter: checks stored template libraries for authoring mistakes.
///
/// Usage: template_linter <templates.ron | templates_dir>

use prompt_chain::core::directive::{directive_args, tokenize, Token};
use prompt_chain::core::grammar::{is_malformed_break, parse_blocks};
use prompt_chain::core::knowledge::{split_knowledge, KnowledgeSegment};
use prompt_chain::core::placeholder::referenced_placeholders;
use prompt_chain::core::roles::{is_role_marker, split_role_sections};
use prompt_chain::core::store::MemoryTemplateStore;
use prompt_chain::schema::template::TemplateRecord;
use rustc_hash::FxHashSet;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: template_linter <templates.ron | templates_dir>");
        process::exit(0);
    }

    let path = Path::new(&args[1]);
    let loaded = if path.is_file() {
        MemoryTemplateStore::load_from_ron(path)
    } else if path.is_dir() {
        MemoryTemplateStore::load_dir(path)
    } else {
        eprintln!("ERROR: Path '{}' does not exist", path.display());
        process::exit(1);
    };
    let store = match loaded {
        Ok(store) => store,
        Err(e) => {
            eprintln!("ERROR: Failed to load templates: {}", e);
            process::exit(1);
        }
    };

    println!("Loaded {} templates", store.len());
    println!("\n=== Template Lint Report ===\n");

    let mut error_count = 0;
    let mut warning_count = 0;
    for record in store.records() {
        let (errors, warnings) = lint_template(record);
        for warning in &warnings {
            println!("WARNING [{}]: {}", record.id, warning);
        }
        for error in &errors {
            println!("ERROR [{}]: {}", record.id, error);
        }
        error_count += errors.len();
        warning_count += warnings.len();
    }

    if error_count == 0 && warning_count == 0 {
        println!("All checks passed!");
    }
    println!(
        "\nSummary: {} errors, {} warnings",
        error_count, warning_count
    );

    if error_count > 0 {
        process::exit(1);
    }
}

fn lint_template(record: &TemplateRecord) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let blocks = match parse_blocks(&record.text) {
        Ok(blocks) => blocks,
        Err(e) => {
            errors.push(e.to_string());
            return (errors, warnings);
        }
    };

    // Directives that will be sent to the model as literal text.
    for token in tokenize(&record.text) {
        if let Token::Tag { raw, body } = token {
            if is_malformed_break(body) {
                warnings.push(format!("Malformed break directive '{}' is kept as text", raw));
            }
        }
    }
    for segment in split_knowledge(&record.text) {
        if let KnowledgeSegment::Text(text) = segment {
            for token in tokenize(text) {
                if let Token::Tag { raw, body } = token {
                    if directive_args(body, "knowledgebase").is_some() {
                        warnings.push(format!(
                            "Knowledge directive '{}' has no filter and is kept as text",
                            raw
                        ));
                    }
                }
            }
        }
    }

    // Role sections: only the first block may have them, and they must be well formed.
    for (index, block) in blocks.iter().enumerate() {
        let has_markers = tokenize(&block.template)
            .iter()
            .any(|t| matches!(t, Token::Tag { body, .. } if is_role_marker(body)));
        if !has_markers {
            continue;
        }
        if index > 0 {
            warnings.push(format!(
                "Block '{}' has role sections; only the first block may use them",
                block.output_var_name
            ));
        } else if split_role_sections(&block.template).is_none() {
            warnings.push(format!(
                "Role sections in block '{}' are malformed; the block is sent as one user message",
                block.output_var_name
            ));
        }
    }

    // Placeholder coverage.
    let declared: FxHashSet<&str> = record.placeholders.iter().map(|p| p.name.as_str()).collect();
    let mut produced: FxHashSet<&str> = FxHashSet::default();
    let mut referenced: FxHashSet<String> = FxHashSet::default();
    for block in &blocks {
        for name in referenced_placeholders(&block.template) {
            if !declared.contains(name.as_str()) && !produced.contains(name.as_str()) {
                warnings.push(format!(
                    "Placeholder '{}' in block '{}' is neither declared nor produced by an earlier block",
                    name, block.output_var_name
                ));
            }
            referenced.insert(name);
        }
        produced.insert(block.output_var_name.as_str());
    }
    for definition in &record.placeholders {
        if !referenced.contains(&definition.name) {
            warnings.push(format!(
                "Declared placeholder '{}' is never used",
                definition.name
            ));
        }
    }

    (errors, warnings)
}
