//! `models` command.

use std::process::ExitCode;

use anyhow::Result;

use super::Context;

pub fn run(ctx: &Context, json: bool) -> Result<ExitCode> {
    if json {
        let listing = serde_json::to_string_pretty(ctx.registry.list_models())?;
        println!("{listing}");
        return Ok(ExitCode::SUCCESS);
    }

    let default = &ctx.registry.default_model().id;
    println!("Available models ({}):", ctx.registry.len());
    for model in ctx.registry.list_models() {
        let marker = if &model.id == default {
            " (default)"
        } else {
            ""
        };
        println!("  {:<22} {}{}", model.id, model.endpoint, marker);
        if !model.description.is_empty() {
            println!("  {:<22} {}", "", model.description);
        }
    }

    Ok(ExitCode::SUCCESS)
}
