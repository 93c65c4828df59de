/// Scenario mapper: filters the release/runout results table into
/// named scenario subsets for mapping and publication.
///
/// Configuration: scenmapper.toml (+ optional local_scenmapper.toml
/// override) with [workflow], [paths] and [[scenario]] sections.
/// Input is a GeoJSON FeatureCollection; geometry and CRS pass through
/// untouched.
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use avascen_core::caaml;
use avascen_core::col;
use avascen_core::criteria::ScenarioSpec;
use avascen_core::{
    master_table, normalize_specs, run_scenarios, Legend, ResultTable, ScenarioCriteria,
};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "scenmapper",
    about = "Filter release/runout results into named scenario subsets"
)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "scenmapper.toml")]
    config: PathBuf,

    /// List available attributes in the input table and exit
    #[arg(long)]
    check: bool,
}

// ── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    workflow: Workflow,
    paths: Paths,
    scenario: Vec<ScenarioSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Workflow {
    log_level: String,
    use_caaml: bool,
    check_input: bool,
    make_master: bool,
    write_geojson: bool,
    write_csv: bool,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            use_caaml: false,
            check_input: false,
            make_master: false,
            write_geojson: true,
            write_csv: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Paths {
    /// "auto" resolves the model-chain hierarchy under base_dir;
    /// "custom" takes results/out_dir verbatim.
    mode: Option<String>,
    base_dir: Option<PathBuf>,
    results: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    caaml: Option<PathBuf>,
}

/// Read the main configuration and, when present, the key-by-key
/// local_<name> override next to it.
fn load_config(path: &Path) -> Result<Config> {
    let main = fs::read_to_string(path)
        .with_context(|| format!("missing configuration file: {}", path.display()))?;
    let mut value: toml::Value = main
        .parse()
        .with_context(|| format!("invalid TOML in {}", path.display()))?;

    let local = local_override_path(path);
    if local.is_file() {
        let over: toml::Value = fs::read_to_string(&local)?
            .parse()
            .with_context(|| format!("invalid TOML in {}", local.display()))?;
        merge_toml(&mut value, over);
    }

    value
        .try_into()
        .with_context(|| format!("invalid configuration in {}", path.display()))
}

fn local_override_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("local_{name}"))
}

/// Recursive table merge; scalar and array values from the override
/// replace the base wholesale.
fn merge_toml(base: &mut toml::Value, over: toml::Value) {
    match (base, over) {
        (toml::Value::Table(b), toml::Value::Table(o)) => {
            for (key, value) in o {
                match b.get_mut(&key) {
                    Some(slot) => merge_toml(slot, value),
                    None => {
                        b.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

// ── Path resolution ──────────────────────────────────────────────────────────

struct ResolvedPaths {
    base_dir: PathBuf,
    results: PathBuf,
    out_dir: PathBuf,
}

fn resolve_paths(cfg: &Paths) -> Result<ResolvedPaths> {
    let mode = cfg
        .mode
        .as_deref()
        .unwrap_or("auto")
        .trim()
        .to_ascii_lowercase();
    let base_dir = cfg.base_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    let (results, out_dir) = if mode == "custom" {
        let results = cfg
            .results
            .clone()
            .context("custom path mode needs [paths].results")?;
        let out_dir = cfg
            .out_dir
            .clone()
            .context("custom path mode needs [paths].out_dir")?;
        (results, out_dir)
    } else {
        let root = base_dir.join("12_avaDirectory");
        // Results usually live one run-folder down; fall back to the
        // flat legacy layout.
        let results = discover_results(&root)
            .unwrap_or_else(|| root.join("avaDirectoryResults.geojson"));
        (results, base_dir.join("13_avaScenMaps"))
    };

    fs::create_dir_all(&out_dir)
        .with_context(|| format!("cannot create output folder {}", out_dir.display()))?;
    info!("input results : {}", rel(&results, &base_dir));
    info!("output folder : {}", rel(&out_dir, &base_dir));
    Ok(ResolvedPaths {
        base_dir,
        results,
        out_dir,
    })
}

fn discover_results(root: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(root).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path().join("avaDirectoryResults.geojson"))
        .filter(|p| p.is_file())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

fn rel(path: &Path, base: &Path) -> String {
    path.strip_prefix(base).unwrap_or(path).display().to_string()
}

// ── Table I/O ────────────────────────────────────────────────────────────────

fn read_table(path: &Path) -> Result<ResultTable> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("input file not found: {}", path.display()))?;
    let doc: Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    let table = table_from_json(doc)?;
    info!("loaded {} rows from {}", table.len(), path.display());
    Ok(table)
}

/// Accepts a GeoJSON FeatureCollection or a plain array of records.
fn table_from_json(doc: Value) -> Result<ResultTable> {
    let crs = doc.get("crs").cloned();
    let mut records = Vec::new();
    if let Some(features) = doc.get("features").and_then(Value::as_array) {
        for feature in features {
            let mut record = feature
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            if let Some(geometry) = feature.get("geometry") {
                record.insert(col::GEOMETRY.to_string(), geometry.clone());
            }
            records.push(record);
        }
    } else if let Some(rows) = doc.as_array() {
        for row in rows {
            records.push(
                row.as_object()
                    .cloned()
                    .context("record is not a JSON object")?,
            );
        }
    } else {
        bail!("expected a FeatureCollection or an array of records");
    }
    Ok(ResultTable::from_records(records, crs))
}

fn write_geojson(table: &ResultTable, path: &Path) -> Result<()> {
    let features: Vec<Value> = table
        .to_records()
        .into_iter()
        .map(|mut record| {
            let geometry = record.remove(col::GEOMETRY).unwrap_or(Value::Null);
            json!({
                "type": "Feature",
                "properties": Value::Object(record),
                "geometry": geometry,
            })
        })
        .collect();
    let mut doc = json!({ "type": "FeatureCollection", "features": features });
    if let (Some(obj), Some(crs)) = (doc.as_object_mut(), &table.crs) {
        obj.insert("crs".to_string(), crs.clone());
    }
    fs::write(path, serde_json::to_string(&doc)?)
        .with_context(|| format!("cannot write {}", path.display()))
}

/// Attribute columns only; geometry is not rendered to CSV.
fn write_csv(table: &ResultTable, path: &Path) -> Result<()> {
    let columns: Vec<&str> = table
        .columns
        .names()
        .filter(|c| *c != col::GEOMETRY)
        .collect();
    let records = table.to_records();
    let mut out = String::new();
    let header: Vec<String> = columns.iter().map(|c| csv_field(c)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for record in &records {
        let row: Vec<String> = columns
            .iter()
            .map(|c| match record.get(*c) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => csv_field(s),
                Some(other) => csv_field(&other.to_string()),
            })
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    fs::write(path, out).with_context(|| format!("cannot write {}", path.display()))
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

// ── Output targets ───────────────────────────────────────────────────────────

struct OutputTargets {
    geojson: Option<PathBuf>,
    csv: Option<PathBuf>,
}

fn output_targets(out_dir: &Path, stem: &str, workflow: &Workflow) -> OutputTargets {
    OutputTargets {
        geojson: workflow
            .write_geojson
            .then(|| out_dir.join(format!("avaScen_{stem}.geojson"))),
        csv: workflow
            .write_csv
            .then(|| out_dir.join(format!("avaScen_{stem}.csv"))),
    }
}

impl OutputTargets {
    fn none_enabled(&self) -> bool {
        self.geojson.is_none() && self.csv.is_none()
    }

    fn any_existing(&self) -> Option<&Path> {
        [&self.geojson, &self.csv]
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
            .find(|p| p.exists())
    }
}

fn write_outputs(table: &ResultTable, targets: &OutputTargets, base_dir: &Path) -> Result<()> {
    if let Some(path) = &targets.geojson {
        write_geojson(table, path)?;
        info!("wrote {}", rel(path, base_dir));
    }
    if let Some(path) = &targets.csv {
        write_csv(table, path)?;
        info!("wrote {}", rel(path, base_dir));
    }
    Ok(())
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

// ── Diagnostics ──────────────────────────────────────────────────────────────

/// Pre-run attribute listing: numeric ranges, categorical uniques and
/// the release-area count, as an aid for writing scenario definitions.
fn log_available_attributes(table: &ResultTable) {
    info!("available attributes ({} rows):", table.len());
    let records = table.to_records();
    for name in table.columns.names() {
        if name == col::GEOMETRY {
            continue;
        }
        let values: Vec<&Value> = records
            .iter()
            .filter_map(|r| r.get(name))
            .filter(|v| !v.is_null())
            .collect();
        if values.is_empty() {
            info!("   {name:<16}: (all null)");
            continue;
        }
        let numeric: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
        if numeric.len() == values.len() {
            let min = numeric.iter().copied().fold(f64::INFINITY, f64::min);
            let max = numeric.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            info!("   {name:<16}: {min} -> {max}");
        } else {
            let mut uniq: Vec<String> = values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            uniq.sort();
            uniq.dedup();
            let shown = if uniq.len() > 20 {
                format!("{} ... ({} unique)", uniq[..20].join(", "), uniq.len())
            } else {
                uniq.join(", ")
            };
            info!("   {name:<16}: {shown}");
        }
    }
    let unique: HashSet<&str> = table
        .rows
        .iter()
        .filter_map(|r| r.release_area_id.as_deref())
        .collect();
    info!("   release areas   : {} unique", unique.len());
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = load_config(&args.config)?;
    init_logging(&cfg.workflow.log_level);
    run(&args, &cfg)
}

fn run(args: &Args, cfg: &Config) -> Result<()> {
    let t0 = Instant::now();
    info!("=== avalanche scenario mapper ===");

    let paths = resolve_paths(&cfg.paths)?;
    let table = read_table(&paths.results)?;
    table
        .validate()
        .context("input dataset incomplete; verify the upstream results export")?;
    if table.is_empty() {
        bail!("input dataset is empty; nothing to process");
    }

    if args.check || cfg.workflow.check_input {
        log_available_attributes(&table);
        warn!("diagnostic mode: define scenarios in the configuration and run again");
        return Ok(());
    }

    let specs: Vec<ScenarioSpec> = if cfg.workflow.use_caaml {
        let source = cfg
            .paths
            .caaml
            .clone()
            .unwrap_or_else(|| paths.base_dir.join("caaml.json"));
        caaml::parse_caaml_to_specs(&source)
    } else {
        cfg.scenario.clone()
    };
    if specs.is_empty() {
        warn!("no scenarios configured; nothing to do");
        return Ok(());
    }

    let criteria = normalize_specs(&specs);
    if criteria.is_empty() {
        warn!("no valid scenarios after normalization; nothing to do");
        return Ok(());
    }

    // Scenarios whose outputs already exist are skipped up front.
    let mut to_run: Vec<ScenarioCriteria> = Vec::new();
    let mut skipped = 0usize;
    for crit in criteria {
        let targets = output_targets(&paths.out_dir, &sanitize_name(&crit.name), &cfg.workflow);
        if let Some(existing) = targets.any_existing() {
            skipped += 1;
            info!(
                "skipping scenario '{}': output already exists: {}",
                crit.name,
                rel(existing, &paths.base_dir)
            );
            continue;
        }
        to_run.push(crit);
    }
    if to_run.is_empty() {
        warn!("all {skipped} scenario(s) already have outputs; nothing to do");
        return Ok(());
    }
    info!("running {} scenario(s), {skipped} skipped", to_run.len());

    let legend = Legend::build().context("classification legend")?;
    info!("classification legend loaded ({} entries)", legend.entries().len());

    let results = run_scenarios(&table, &to_run, &legend);
    if results.is_empty() {
        warn!("no scenario produced output; nothing to export");
        return Ok(());
    }

    for result in &results {
        let stem = sanitize_name(&result.criteria.name);
        let targets = output_targets(&paths.out_dir, &stem, &cfg.workflow);
        if targets.none_enabled() {
            warn!(
                "no output format enabled for scenario '{}'; skipping write",
                result.criteria.name
            );
            continue;
        }
        if let Err(err) = write_outputs(&result.table, &targets, &paths.base_dir) {
            error!("failed writing scenario '{}': {err:#}", result.criteria.name);
        }
    }

    if cfg.workflow.make_master {
        if let Some(master) = master_table(&results) {
            info!(
                "master union: {} rows, coordinate reference inherited from first scenario",
                master.len()
            );
            let targets = output_targets(&paths.out_dir, "Master", &cfg.workflow);
            if targets.none_enabled() {
                warn!("no output format enabled for master; skipping write");
            } else if let Err(err) = write_outputs(&master, &targets, &paths.base_dir) {
                error!("failed writing master: {err:#}");
            }
        }
    }

    info!("scenario mapper finished in {:.2}s", t0.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_toml_overrides_key_by_key() {
        let mut base: toml::Value = r#"
            [workflow]
            log_level = "info"
            make_master = false
        "#
        .parse()
        .unwrap();
        let over: toml::Value = r#"
            [workflow]
            make_master = true
        "#
        .parse()
        .unwrap();
        merge_toml(&mut base, over);
        let cfg: Config = base.try_into().unwrap();
        assert!(cfg.workflow.make_master);
        assert_eq!(cfg.workflow.log_level, "info");
    }

    #[test]
    fn config_parses_scenario_sections() {
        let cfg: Config = toml::from_str(
            r#"
            [workflow]
            write_csv = true

            [[scenario]]
            name = "north-dry"
            flows = "dry"
            sectors = ["N", "NE"]
            elev_min = 1800

            [[scenario]]
            name = "high-pot"
            potentials = "high, very high"
            size_class = 3
        "#,
        )
        .unwrap();
        assert_eq!(cfg.scenario.len(), 2);
        let criteria = normalize_specs(&cfg.scenario);
        assert_eq!(criteria.len(), 2);
        assert_eq!(criteria[0].name, "north-dry");
        assert_eq!(criteria[0].sectors.len(), 2);
        assert_eq!(criteria[1].size_class, Some(3));
    }

    #[test]
    fn local_override_path_prefixes_file_name() {
        assert_eq!(
            local_override_path(Path::new("conf/scenmapper.toml")),
            Path::new("conf/local_scenmapper.toml")
        );
    }

    #[test]
    fn sanitize_name_strips_path_hostile_characters() {
        assert_eq!(sanitize_name("North Slope / dry"), "NorthSlopedry");
        assert_eq!(sanitize_name("scen_01-a"), "scen_01-a");
        assert_eq!(sanitize_name("///"), "unnamed");
    }

    #[test]
    fn csv_field_quotes_separators_and_quotes() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn feature_collection_round_trips_through_table() {
        let doc = json!({
            "type": "FeatureCollection",
            "crs": {"init": "epsg:31287"},
            "features": [{
                "type": "Feature",
                "properties": {"praID": "pra1", "flow": "Dry", "rSize": 3},
                "geometry": {"type": "Point", "coordinates": [11.0, 47.0]}
            }]
        });
        let table = table_from_json(doc).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.crs, Some(json!({"init": "epsg:31287"})));
        assert!(table.rows[0].geometry.is_some());
        assert_eq!(table.rows[0].release_area_id.as_deref(), Some("pra1"));
    }

    #[test]
    fn plain_record_array_is_accepted() {
        let doc = json!([
            {"praID": "a", "rSize": 1},
            {"praID": "b", "rSize": 2}
        ]);
        let table = table_from_json(doc).unwrap();
        assert_eq!(table.len(), 2);
    }
}
