use crate::domain::models::JsonOut;
use serde::Serialize;
use std::io::Write;

fn envelope<T: Serialize>(data: T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&JsonOut { ok: true, data })?)
}

/// One text line per item, or a single JSON array under `data`.
pub fn print_out<T: Serialize>(
    json: bool,
    items: &[T],
    line: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        println!("{}", envelope(items)?);
        return Ok(());
    }
    let mut out = std::io::stdout().lock();
    for item in items {
        writeln!(out, "{}", line(item))?;
    }
    Ok(())
}

pub fn print_one<T: Serialize>(
    json: bool,
    item: T,
    text: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        println!("{}", envelope(&item)?);
    } else {
        println!("{}", text(&item));
    }
    Ok(())
}
