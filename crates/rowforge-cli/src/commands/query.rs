use anyhow::{bail, Result};

use rowforge_core::query;

use crate::args::QueryArgs;
use crate::commands::read_query;

pub async fn run(args: &QueryArgs) -> Result<()> {
    let Some(sql) = read_query(args.query.as_deref(), args.query_file.as_deref())? else {
        bail!("need --query or --query-file");
    };
    let analysis = query::analyze(&sql, args.engine.into())?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}
