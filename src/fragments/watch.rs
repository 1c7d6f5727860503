//! Watch fragment: recompile on change.

use serde_json::json;

use crate::configurator::Configurator;
use crate::error::Result;
use crate::options::MultiConfOptions;

pub fn configure(configurator: &mut Configurator, options: &mut MultiConfOptions) -> Result<()> {
    let devtool = options
        .devtool
        .clone()
        .unwrap_or_else(|| options.build.devtool.clone());
    configurator.merge(json!({
        "devtool": devtool,
        "watch": true,
        "output": {
            "pathinfo": true
        }
    }))
}
