pub mod bounds;
pub mod expand;
pub mod freebusy;
pub mod query;
pub mod schedule;

use anyhow::Result;
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
