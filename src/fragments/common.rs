//! Common fragment
//!
//! Applied to every target after the user's `configure`. It sets up module
//! resolution, registers the default loaders for the enabled features and
//! finishes with the define plugin that exposes whitelisted environment
//! variables to the bundle.
//!
//! Loader names registered here are stable so later fragments (and the
//! user's `post_configure`) can modify or remove them:
//! `eslint`, `json-schema`, `json`, `worker`, `ts`, `babel`, `dsv`, `xml`,
//! `file`, `glsl`, `base64Fonts`, `ttf`, `woff`, `stylus`.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info};
use serde_json::{json, Map, Value};

use crate::configurator::{Configurator, Patch};
use crate::descriptor::object_entry;
use crate::error::{Error, Result};
use crate::libs;
use crate::options::{EnvDefault, Es2015Preset, MultiConfOptions, TsLoader};
use crate::plugins::{define, passthrough};
use crate::process;

/// Upper bound when walking from the tool's modules dir up to the project.
const MAX_LOADER_DEPTH: usize = 50;

const COMMIT_HASH_DISABLED: &str = "<DISABLED>";

pub fn configure(conf: &mut Configurator, options: &mut MultiConfOptions) -> Result<()> {
    let cwd = conf.cwd().to_path_buf();
    let mut extensions: Vec<&'static str> = Vec::new();

    base_config(conf, options, &cwd)?;
    register_loaders(conf, options, &cwd, &mut extensions)?;
    register_plugins(conf, options)?;

    conf.merge(Patch::replace(move |mut current| {
        object_entry(&mut current, "resolve").insert("extensions".to_string(), json!(extensions));
        Some(current)
    }))?;

    let whitelist = collect_env_whitelist(conf, options, &cwd)?;
    let defines = build_defines(options, &cwd, whitelist)?;
    conf.plugin(
        "webpackDefine",
        define(),
        vec![define_options(&defines, options.flat_process_env)],
    )
}

/// Module search paths for loaders, innermost first.
fn loader_modules(cwd: &Path, tool_modules_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut modules = vec![cwd.join("node_modules")];
    let tool_dir = match tool_modules_dir {
        Some(dir) => dir,
        None => return Ok(modules),
    };
    modules.push(tool_dir.to_path_buf());

    // When installed inside the project, loaders may have been hoisted to
    // any directory between the tool and the project root.
    if tool_dir.starts_with(cwd) {
        let mut current = tool_dir.parent();
        let mut depth = 0;
        while let Some(dir) = current {
            if dir == cwd {
                break;
            }
            depth += 1;
            if depth > MAX_LOADER_DEPTH {
                return Err(Error::Config {
                    message: "max depth exceeded".to_string(),
                });
            }
            modules.push(dir.to_path_buf());
            current = dir.parent();
        }
    }
    Ok(modules)
}

fn base_config(conf: &mut Configurator, options: &MultiConfOptions, cwd: &Path) -> Result<()> {
    let tool_dir = options.build.tool_modules_dir.clone();
    let mut resolve_modules = vec![cwd.join("node_modules")];
    if let Some(dir) = &tool_dir {
        resolve_modules.push(dir.clone());
    }
    let loader_modules = loader_modules(cwd, tool_dir.as_deref())?;

    let devtool = options.devtool.clone();
    let backend_build = options.backend_build;
    let node_externals = json!({
        "modulesFromFile": options.node_externals.modules_from_file,
        "whitelist": options.node_externals.whitelist,
    });

    conf.merge(Patch::replace(move |mut current| {
        object_entry(&mut current, "resolve").insert("modules".to_string(), json!(resolve_modules));
        object_entry(&mut current, "resolveLoader")
            .insert("modules".to_string(), json!(loader_modules));

        let map = current.as_object_mut()?;
        map.insert("devtool".to_string(), json!(devtool));

        if backend_build {
            map.insert("target".to_string(), json!("node"));
            let externals = map
                .entry("externals".to_string())
                .or_insert_with(|| json!([]));
            if !externals.is_array() {
                *externals = json!([externals.clone()]);
            }
            if let Some(list) = externals.as_array_mut() {
                list.push(json!({ "nodeExternals": node_externals }));
            }
            map.insert(
                "node".to_string(),
                json!({"__dirname": false, "__filename": false}),
            );
        }
        Some(current)
    }))
}

/// Resolve a loader-side module name against the tool's modules dir.
fn resolve_module(options: &MultiConfOptions, name: &str) -> String {
    match &options.build.tool_modules_dir {
        Some(dir) => dir.join(name).to_string_lossy().into_owned(),
        None => name.to_string(),
    }
}

fn babel_loader(options: &MultiConfOptions) -> Value {
    let mut presets = Vec::new();
    match options.es2015 {
        Es2015Preset::Default => presets.push(json!([
            resolve_module(options, "babel-preset-es2015"),
            {"loose": true, "modules": false}
        ])),
        Es2015Preset::WithoutStrict => presets.push(json!(resolve_module(
            options,
            "babel-preset-es2015-without-strict"
        ))),
    }
    if options.use_jsx {
        presets.push(json!(resolve_module(options, "babel-preset-react")));
    }

    let mut plugins = vec![
        resolve_module(options, "babel-plugin-transform-object-assign"),
        resolve_module(options, "babel-plugin-transform-object-rest-spread"),
    ];
    if options.use_react_hot {
        plugins.push(resolve_module(options, "react-hot-loader/babel"));
    }

    json!({
        "loader": "babel-loader",
        "options": {
            "presets": presets,
            "plugins": plugins,
            "cacheDirectory": true
        }
    })
}

fn typescript_loader(conf: &mut Configurator, options: &MultiConfOptions, cwd: &Path) -> Result<Value> {
    match options.ts_loader {
        TsLoader::TsLoader => Ok(json!({
            "loader": "ts-loader",
            "options": {
                "visualStudioErrorFormat": true,
                "ignoreDiagnostics": options.typescript_ignore_diagnostics
            }
        })),
        TsLoader::AwesomeTypescriptLoader => {
            conf.plugin("atl-CheckerPlugin", passthrough("typescript-checker"), Vec::new())?;
            let cache_dir = cwd
                .join("node_modules")
                .join(".cache")
                .join("awesome-typescript-loader")
                .join("awcache");
            Ok(json!({
                "loader": "awesome-typescript-loader",
                "options": {
                    "visualStudioErrorFormat": true,
                    "ignoreDiagnostics": options.typescript_ignore_diagnostics,
                    "useBabel": true,
                    "useCache": true,
                    "babelCore": resolve_module(options, "babel-core"),
                    "cacheDirectory": cache_dir.to_string_lossy(),
                    "reportFiles": ["src/*.{ts,tsx}", "src/**/*.{ts,tsx}"]
                }
            }))
        }
    }
}

fn register_loaders(
    conf: &mut Configurator,
    options: &MultiConfOptions,
    cwd: &Path,
    extensions: &mut Vec<&'static str>,
) -> Result<()> {
    if options.use_es_lint {
        conf.loader(
            "eslint",
            json!({
                "test": "\\.jsx?$",
                "exclude": "(node_modules)",
                "loader": "eslint-loader",
                "enforce": "pre"
            }),
        );
    }

    if options.use_json_schema {
        extensions.push(".schema.json");
        conf.loader(
            "json-schema",
            json!({
                "test": "\\.schema\\.json$",
                "use": [
                    {"loader": "json-schema-loader", "options": {"useSource": true}},
                    {"loader": "webpack-comment-remover-loader"}
                ]
            }),
        );
    }

    // Excludes .schema.json files.
    conf.loader(
        "json",
        json!({
            "test": "^[^\\.]+?(?!\\.schema)\\.json$",
            "use": ["json-loader", "webpack-comment-remover-loader"]
        }),
    );

    let ifdef_loader = json!({
        "loader": "ifdef-loader",
        "options": Value::Object(options.ifdef_opts.clone())
    });

    conf.loader(
        "worker",
        json!({
            "test": "\\.worker\\.js$",
            "use": [
                {"loader": "worker-loader", "options": {"inline": true}},
                ifdef_loader
            ]
        }),
    );

    let babel = babel_loader(options);

    if options.use_typescript {
        extensions.push(".ts");
        if options.use_jsx {
            extensions.push(".tsx");
        }
        let ts = typescript_loader(conf, options, cwd)?;
        conf.loader(
            "ts",
            json!({
                "test": if options.use_jsx { "\\.tsx?$" } else { "\\.ts$" },
                "use": [babel, ts, ifdef_loader]
            }),
        );
    }

    extensions.push(".js");
    if options.use_jsx {
        extensions.push(".jsx");
    }
    conf.loader(
        "babel",
        json!({
            "test": if options.use_jsx { "\\.jsx?$" } else { "\\.js$" },
            "exclude": "(node_modules)",
            "use": [babel, ifdef_loader]
        }),
    );

    conf.loader("dsv", json!({"test": "\\.(csv)$", "loader": "dsv-loader"}));
    conf.loader("xml", json!({"test": "\\.(xml)$", "loader": "xml-loader"}));
    conf.loader(
        "file",
        json!({
            "test": "\\.(jpe?g|gif|png|wav|mp3|ogv|ogg|mp4|webm)$",
            "loader": "file-loader"
        }),
    );

    if options.use_shaders {
        extensions.extend([".vert", ".frag", ".glsl"]);
        conf.loader(
            "glsl",
            json!({"test": "\\.(glsl|vert|frag)$", "loader": "glsl-template-loader"}),
        );
    }

    if options.use_fonts {
        if options.use_base64_font_loader {
            conf.loader(
                "base64Fonts",
                json!({
                    "test": "\\.(eot|svg|ttf|woff|woff2|otf)?(\\?v=[0-9]\\.[0-9]\\.[0-9])?$",
                    "loader": "base64-font-loader"
                }),
            );
        } else {
            conf.loader(
                "ttf",
                json!({
                    "test": "\\.(ttf|eot|svg)(\\?v=[0-9]\\.[0-9]\\.[0-9])?$",
                    "loader": "file-loader"
                }),
            );
            conf.loader(
                "woff",
                json!({
                    "test": "\\.woff(2)?(\\?v=[0-9]\\.[0-9]\\.[0-9])?$",
                    "use": [{
                        "loader": "url-loader",
                        "options": {"limit": 10000, "mimetype": "application/font-woff"}
                    }]
                }),
            );
        }
    }

    Ok(())
}

fn register_plugins(conf: &mut Configurator, options: &MultiConfOptions) -> Result<()> {
    conf.plugin(
        "progressBar",
        passthrough("progress-bar"),
        vec![json!({
            "renderThrottle": 100,
            "format": "  Building [:bar] :percent (:elapsed seconds)"
        })],
    )?;

    if options.use_vendor_chunk {
        conf.plugin(
            "vendorChunk",
            passthrough("commons-chunk"),
            vec![json!({"name": "vendors", "minChunks": {"external": "/node_modules/"}})],
        )?;
    }

    if options.backend_build {
        conf.plugin(
            "sourceMapSupport",
            passthrough("banner"),
            vec![json!({
                "banner": "require(\"source-map-support\").install();",
                "raw": true,
                "entryOnly": false
            })],
        )?;
    }

    if options.use_circular_dependency_plugin {
        conf.plugin(
            "CircularDependencyPlugin",
            passthrough("circular-dependency"),
            vec![json!({"failOnError": false})],
        )?;
    }

    if options.use_notifications {
        conf.plugin("Notification", passthrough("error-notification"), Vec::new())?;
    }

    if options.use_visualizer_plugin {
        conf.plugin("Visualizer", passthrough("visualizer"), Vec::new())?;
    }

    if options.use_stylus {
        let stylus_loader = json!({
            "loader": "stylus-loader",
            "options": {
                "use": ["nib"],
                "import": ["~nib/lib/nib/index.styl"],
                "preferPathResolver": "webpack"
            }
        });

        if options.env.node_env() == "production" && options.use_stylus_extract_text {
            conf.loader(
                "stylus",
                json!({
                    "test": "\\.styl$",
                    "use": [
                        {"loader": "extract-text-loader", "options": {"fallback": "style-loader"}},
                        {"loader": "css-loader"},
                        stylus_loader
                    ]
                }),
            );
            conf.plugin(
                "stylusExtractText",
                passthrough("extract-text"),
                vec![json!("[name].css")],
            )?;
        } else {
            // Plain style-loader keeps CSS hot-reloadable in development.
            conf.loader(
                "stylus",
                json!({
                    "test": "\\.styl$",
                    "use": [{"loader": "style-loader"}, {"loader": "css-loader"}, stylus_loader]
                }),
            );
        }
    }

    if let Some(key) = options.env.non_empty("WEBPACK_ENCRYPTION_KEY") {
        conf.plugin(
            "BuildEncryption",
            passthrough("build-encryption"),
            vec![json!({"encryptionKey": key})],
        )?;
    }

    Ok(())
}

/// Merge whitelist entries into `whitelist`, resolving each value from the
/// environment snapshot first and the default second.
fn add_to_whitelist(
    whitelist: &mut IndexMap<String, String>,
    entries: IndexMap<String, EnvDefault>,
    options: &MultiConfOptions,
) {
    debug!("addTowhitelist {:?}", entries);
    for (key, default) in entries {
        if let Some(existing) = whitelist.get(&key) {
            info!("Overwriting existing envWhitelist entry: {} = {}", key, existing);
        }
        let value = match options.env.non_empty(&key) {
            Some(value) => value.to_string(),
            None => default
                .for_env(options.env.node_env())
                .unwrap_or_default()
                .to_string(),
        };
        whitelist.insert(key, value);
    }
}

fn collect_env_whitelist(
    conf: &mut Configurator,
    options: &MultiConfOptions,
    cwd: &Path,
) -> Result<IndexMap<String, String>> {
    let mut whitelist = IndexMap::new();
    add_to_whitelist(&mut whitelist, options.env_whitelist.entries(), options);

    if options.scan_libs {
        info!("Getting module aliases...");
        let module_opts = libs::scan_module_opts(cwd, options.use_module_aliases)?;
        debug!("Found module opts: {:?}", module_opts);
        if options.use_module_aliases {
            let aliases: Map<String, Value> = module_opts
                .aliases
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();
            conf.merge(json!({"resolve": {"alias": aliases}}))?;
        }
        add_to_whitelist(&mut whitelist, module_opts.env_whitelist, options);
    }

    Ok(whitelist)
}

fn build_defines(
    options: &MultiConfOptions,
    cwd: &Path,
    whitelist: IndexMap<String, String>,
) -> Result<IndexMap<String, String>> {
    let mut defines = IndexMap::new();
    defines.insert("NODE_ENV".to_string(), options.env.node_env().to_string());

    let commit_hash = if options
        .use_git_revision_plugin
        .applies(options.env.node_env())
    {
        process::git_commit_hash(cwd)?
    } else {
        COMMIT_HASH_DISABLED.to_string()
    };
    defines.insert("COMMITHASH".to_string(), commit_hash);

    debug!("envWhitelist={:?}", whitelist);
    defines.extend(whitelist);
    Ok(defines)
}

/// Values are JSON-encoded so the bundler substitutes string literals.
fn define_options(defines: &IndexMap<String, String>, flat: bool) -> Value {
    let encoded = defines
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(Value::String(v.clone()).to_string())));
    if flat {
        Value::Object(
            encoded
                .map(|(k, v)| (format!("process.env.{}", k), v))
                .collect(),
        )
    } else {
        json!({ "process.env": Value::Object(encoded.collect()) })
    }
}
