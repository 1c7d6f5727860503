//! Benchmarks for configuration composition.
//!
//! These measure parsing `packconf.yaml`, running the full fragment chain for
//! a growing number of targets, and resolving configurators with many rules.

use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use packconf::builder::Builder;
use packconf::config;
use packconf::configurator::Configurator;
use packconf::env::EnvironmentSnapshot;
use packconf::plugins::{passthrough, PluginCatalog};
use packconf::settings::BuildSettings;

/// One target with a handful of fragment keys.
const SMALL_CONFIG: &str = r#"
name: app
configure:
  options:
    use_jsx: true
    use_stylus: true
  merge:
    entry: { main: ./src/index.jsx }
    output: { path: ./dist, publicPath: /static/ }
post_configure:
  loader_includes:
    babel: ["glob:src/**"]
  remove_plugins: [progressBar]
"#;

fn generate_targets(count: usize) -> String {
    let mut config = String::new();
    for i in 0..count {
        config.push_str(&format!("- name: target{}\n", i));
        config.push_str("  configure:\n");
        config.push_str("    options:\n");
        config.push_str("      use_typescript: true\n");
        config.push_str("      use_fonts: true\n");
        config.push_str("    merge:\n");
        config.push_str(&format!(
            "      entry: {{ main: ./src/entry{}.ts }}\n",
            i
        ));
        config.push_str("      output: { publicPath: /static/ }\n");
        config.push_str("    loaders:\n");
        config.push_str(&format!(
            "      custom{}: {{ test: \"\\\\.custom{}$\", use: [raw-loader] }}\n",
            i, i
        ));
    }
    config
}

fn bench_parse(c: &mut Criterion) {
    let catalog = PluginCatalog::builtin();
    let path = Path::new("packconf.yaml");
    let mut group = c.benchmark_group("parse");

    group.bench_function("small", |b| {
        b.iter(|| config::parse(black_box(SMALL_CONFIG), path, &catalog))
    });

    let large = generate_targets(50);
    group.bench_function("targets_50", |b| {
        b.iter(|| config::parse(black_box(&large), path, &catalog))
    });

    group.finish();
}

fn bench_compose(c: &mut Criterion) {
    let catalog = PluginCatalog::builtin();
    let mut group = c.benchmark_group("compose");

    for count in [1, 5, 20] {
        let content = generate_targets(count);
        let configs = config::parse(&content, Path::new("packconf.yaml"), &catalog)
            .expect("generated config parses");
        let settings = BuildSettings {
            env: "production".to_string(),
            ..Default::default()
        };
        let env = EnvironmentSnapshot::new("production", [("API_URL", "https://api")]);
        let builder = Builder::new(settings, "/work/project", env);

        group.bench_with_input(BenchmarkId::new("targets", count), &configs, |b, configs| {
            b.iter(|| builder.compose(black_box(configs)))
        });
    }

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for rules in [10, 100, 500] {
        let mut conf = Configurator::new("/work/project");
        for i in 0..rules {
            conf.loader(&format!("rule{}", i), json!({"test": format!("\\.r{}$", i)}));
        }
        for i in 0..rules / 10 {
            conf.plugin(&format!("plugin{}", i), passthrough("banner"), vec![json!(i)])
                .expect("distinct plugin names");
        }

        group.bench_with_input(BenchmarkId::new("rules", rules), &conf, |b, conf| {
            b.iter(|| conf.resolve())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_compose, bench_resolve);
criterion_main!(benches);
