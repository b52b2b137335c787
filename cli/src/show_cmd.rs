use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use modtune_core::ParamId;
use modtune_core::StateStore;

#[derive(Debug, Parser)]
pub struct ShowArgs {
    #[arg(value_name = "MODULE")]
    module: String,

    #[arg(value_name = "PARAM")]
    param: String,

    /// Emit the record as JSON instead of text.
    #[arg(long = "json")]
    json: bool,
}

pub async fn run(store: &StateStore, args: &ShowArgs) -> Result<()> {
    let snapshot = store.refresh().await?;
    let id = ParamId::new(&args.module, &args.param);
    let Some(record) = snapshot.get(&id) else {
        bail!("no such parameter: {id}");
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    let loaded = snapshot
        .modules
        .get(&args.module)
        .is_some_and(|module| module.loaded);
    println!("parameter {id}");
    println!(
        "  module:      {} ({})",
        record.module,
        if loaded { "loaded" } else { "configured, not loaded" }
    );
    let array_suffix = if record.array { " (array)" } else { "" };
    println!("  type:        {}{array_suffix}", record.declared_type);
    if let Some(description) = &record.description {
        println!("  description: {description}");
    }
    match &record.runtime {
        Some(state) => {
            println!("  permission:  {}", state.permission);
            match &state.value {
                Some(value) => println!("  value:       {value}"),
                None => println!("  value:       <unreadable>"),
            }
        }
        None => println!("  value:       - (no runtime state)"),
    }
    if record.persistent.is_empty() {
        println!("  persistent:  none");
    } else {
        println!("  persistent:");
        for entry in &record.persistent {
            let marker = if entry.shadowed { "  (shadowed)" } else { "" };
            println!(
                "    {}:{}  {}={}{marker}",
                entry.file, entry.line, entry.param, entry.value
            );
        }
    }
    Ok(())
}
