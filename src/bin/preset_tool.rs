use anyhow::{anyhow, bail, Result};
use kestrel_preset::{Preset, PresetState};
use std::collections::HashSet;
use std::env;
use std::process;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:?}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };
    match command.as_str() {
        "validate" => {
            let path = args
                .next()
                .ok_or_else(|| anyhow!("validate requires a path: preset_tool validate <preset>"))?;
            cmd_validate(&path)
        }
        "keys" => {
            let path = args.next().ok_or_else(|| anyhow!("keys requires a path: preset_tool keys <preset>"))?;
            cmd_keys(&path)
        }
        "hash" => {
            let path = args.next().ok_or_else(|| anyhow!("hash requires a path: preset_tool hash <preset>"))?;
            cmd_hash(&path)
        }
        "heal" => {
            let input = args
                .next()
                .ok_or_else(|| anyhow!("heal requires input path: preset_tool heal <in> [out]"))?;
            let output = args.next().unwrap_or_else(|| input.clone());
            cmd_heal(&input, &output)
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => Err(anyhow!("unknown command '{other}'")),
    }
}

fn print_usage() {
    eprintln!(
        "Preset Tool

Usage:
  preset_tool validate <preset>     Check target type, value store, and reference table
  preset_tool keys <preset>         List every leaf path and its stored value
  preset_tool hash <preset>         Print the dependency key and content hash
  preset_tool heal <in> [out]       Rewrite a preset whose value store failed to parse
  preset_tool help                  Show this message
"
    );
}

fn cmd_validate(path: &str) -> Result<()> {
    let preset = Preset::load_from_path(path)?;
    let mut issues = Vec::new();

    match preset.state() {
        PresetState::Uninitialized => issues.push("preset has no target type".to_string()),
        PresetState::TypeBound => issues.push("preset has no values".to_string()),
        PresetState::Applicable => {}
    }
    if preset.was_healed() {
        issues.push("value store did not parse and was replaced by an empty store".to_string());
    }
    let mut handles = HashSet::new();
    for handle in preset.object_references().handles() {
        if !handles.insert(handle.key()) {
            issues.push(format!("object reference '{handle}' is recorded more than once"));
        }
    }

    if issues.is_empty() {
        let leaves = preset.values().map(|store| store.leaf_count()).unwrap_or_default();
        println!(
            "Preset '{}' targets '{}' with {} value(s) and {} reference(s).",
            path,
            preset.target_type(),
            leaves,
            preset.object_references().len()
        );
        Ok(())
    } else {
        for issue in &issues {
            eprintln!("- {issue}");
        }
        bail!("preset '{path}' failed validation with {} issue(s)", issues.len())
    }
}

fn cmd_keys(path: &str) -> Result<()> {
    let preset = Preset::load_from_path(path)?;
    let Some(store) = preset.values() else {
        println!("(no values)");
        return Ok(());
    };
    for (path, value) in store.leaf_paths() {
        println!("{path} = {value}");
    }
    Ok(())
}

fn cmd_hash(path: &str) -> Result<()> {
    let preset = Preset::load_from_path(path)?;
    println!("{}  {}", preset.content_hash().to_hex(), preset.dependency_key());
    Ok(())
}

fn cmd_heal(input: &str, output: &str) -> Result<()> {
    let preset = Preset::load_from_path(input)?;
    if !preset.was_healed() && input == output {
        println!("Preset '{input}' is intact; nothing to do.");
        return Ok(());
    }
    preset.save_to_path(output)?;
    println!("Wrote preset to '{output}'.");
    Ok(())
}
