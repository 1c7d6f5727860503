//! Serve fragment: dev-server settings and optional hot module replacement.

use serde_json::json;

use crate::configurator::Configurator;
use crate::error::Result;
use crate::options::MultiConfOptions;
use crate::plugins::passthrough;

pub fn configure(configurator: &mut Configurator, options: &mut MultiConfOptions) -> Result<()> {
    let use_hmr = options.build.serve.use_hmr;
    if use_hmr {
        configurator.plugin(
            "webpackHMR",
            passthrough("hot-module-replacement"),
            Vec::new(),
        )?;
    }

    let devtool = options
        .devtool
        .clone()
        .unwrap_or_else(|| options.build.devtool.clone());
    configurator.merge(json!({
        "devtool": devtool,
        "devServer": {
            "inline": true,
            "hot": use_hmr
        },
        "output": {
            "pathinfo": true
        }
    }))
}
