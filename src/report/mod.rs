pub mod json;
pub mod table;

use serde::Serialize;

/// Prints `value` as JSON, or the table produced by `table` otherwise.
pub fn print<T, F>(value: &T, json_output: bool, table: F)
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    if json_output {
        println!("{}", json::render(value));
    } else {
        print!("{}", table(value));
    }
}
