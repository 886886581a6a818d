//! `gng version`.

use anyhow::Result;

use crate::context::RuntimeContext;

pub fn run(ctx: &RuntimeContext) -> Result<i32> {
    if ctx.json {
        println!(
            "{}",
            serde_json::json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            })
        );
    } else {
        println!("gng {}", env!("CARGO_PKG_VERSION"));
    }
    Ok(0)
}
