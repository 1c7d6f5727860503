//! Production fragment: minify and deduplicate.

use serde_json::json;

use crate::configurator::Configurator;
use crate::error::Result;
use crate::options::MultiConfOptions;
use crate::plugins::passthrough;

pub fn configure(configurator: &mut Configurator, _options: &mut MultiConfOptions) -> Result<()> {
    configurator.plugin(
        "webpackUglify",
        passthrough("uglify"),
        vec![json!({"mangle": {"keep_fnames": true}})],
    )?;
    configurator.plugin("webpackDedupe", passthrough("dedupe"), Vec::new())
}
