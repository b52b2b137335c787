use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use modtune_core::ModuleRecord;
use modtune_core::ParamRecord;
use modtune_core::StateStore;

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Restrict the listing to one module.
    #[arg(long = "module", value_name = "NAME")]
    module: Option<String>,

    /// Emit the snapshot as JSON instead of text.
    #[arg(long = "json")]
    json: bool,
}

pub async fn run(store: &StateStore, args: &ListArgs) -> Result<()> {
    let snapshot = store.refresh().await?;

    if let Some(module) = &args.module {
        let Some(record) = snapshot.modules.get(module) else {
            bail!("no such module: {module}");
        };
        if args.json {
            println!("{}", serde_json::to_string_pretty(record)?);
        } else {
            print_header(snapshot.version, &snapshot.captured_at.to_rfc3339());
            print_module(record);
        }
        return Ok(());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&*snapshot)?);
        return Ok(());
    }

    print_header(snapshot.version, &snapshot.captured_at.to_rfc3339());
    if snapshot.skipped_config_lines > 0 {
        println!(
            "note: {} unrecognized config line(s) skipped",
            snapshot.skipped_config_lines
        );
    }
    for record in snapshot.modules.values() {
        print_module(record);
    }
    Ok(())
}

fn print_header(version: u64, captured_at: &str) {
    println!("snapshot v{version} captured {captured_at}");
}

fn print_module(module: &ModuleRecord) {
    let status = if module.loaded {
        "loaded"
    } else {
        "configured, not loaded"
    };
    println!("{} ({status})", module.name);
    if let Some(warning) = &module.metadata_warning {
        println!("  warning: {warning}");
    }
    for param in module.params.values() {
        println!("  {}", param_row(param));
    }
}

fn param_row(param: &ParamRecord) -> String {
    let perm = param
        .runtime
        .as_ref()
        .map_or("--".to_string(), |state| state.permission.to_string());
    let value = param
        .runtime
        .as_ref()
        .and_then(|state| state.value.as_deref())
        .unwrap_or("-");
    let ty = param.declared_type.to_string();
    let mut row = format!("{name:<24} {perm:>2} {ty:<8} {value}", name = param.name);
    if let Some(entry) = param.effective_persistent() {
        row.push_str(&format!(
            "  [persist: {}={} from {}:{}]",
            entry.param, entry.value, entry.file, entry.line
        ));
    }
    row
}
