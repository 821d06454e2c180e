pub mod calendar;
pub mod planner;
pub mod todo;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Arguments of tools that take none.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoArgs {}

/// Acknowledgement returned by delete tools.
#[derive(Debug, Serialize)]
pub(crate) struct Deleted<'a> {
    pub deleted: bool,
    pub id: &'a str,
}

impl<'a> Deleted<'a> {
    pub(crate) fn new(id: &'a str) -> Self {
        Self { deleted: true, id }
    }
}
