use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use modtune_core::EditOutcome;
use modtune_core::ParamId;
use modtune_core::StateStore;

#[derive(Debug, Parser)]
pub struct SetArgs {
    #[arg(value_name = "MODULE")]
    module: String,

    #[arg(value_name = "PARAM")]
    param: String,

    #[arg(value_name = "VALUE")]
    value: String,
}

pub async fn run(store: &StateStore, args: &SetArgs) -> Result<()> {
    store.refresh().await?;
    let id = ParamId::new(&args.module, &args.param);
    match store.edit(&id, &args.value).await {
        EditOutcome::Applied { observed } => {
            println!("applied: {id} = {observed}");
            Ok(())
        }
        EditOutcome::Rejected { reason } => bail!("edit rejected: {reason}"),
        EditOutcome::Inconclusive {
            requested,
            observed: Some(observed),
        } => {
            // The kernel took the write but reports a different value back.
            println!("inconclusive: wrote `{requested}`, kernel reports `{observed}`");
            Ok(())
        }
        EditOutcome::Inconclusive {
            requested,
            observed: None,
        } => {
            println!("inconclusive: wrote `{requested}` but the value could not be read back");
            Ok(())
        }
    }
}
