//! RSDM Command Line Interface
//!
//! Estimate divergences between bags, cross-validate support distribution
//! machines, and predict labels of new bags, from CSV or JSON data files.

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info, warn};
use rsdm::api::{crossvalidate, crossvalidate_divs, get_divs, transduct, Sdm};
use rsdm::core::{Bag, Label, Options, Result, Scalar, ScalarKind, SdmError, Task};
use rsdm::{parse_div_funcs, BagDataset, CsvBags, CvParams, CvReport, DivFunc, JsonBags, JsonDivs};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "rsdm")]
#[command(about = "Support distribution machines: learning on bags of vectors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "RSDM Contributors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the divergence matrix between bags
    Divs(DivsArgs),
    /// Cross-validate an SDM on bags
    Cv(CvArgs),
    /// Cross-validate an SDM on a precomputed divergence matrix
    CvDivs(CvDivsArgs),
    /// Train on one file and predict the bags of another
    Predict(PredictArgs),
}

#[derive(Args)]
struct EstimatorOpts {
    /// JSON file with estimator and solver options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of nearest neighbors
    #[arg(short, long)]
    k: Option<usize>,

    /// Worker threads for divergence estimation
    #[arg(long)]
    num_threads: Option<usize>,

    /// Storage type of bag values: f32 or f64
    #[arg(long, default_value = "f64")]
    dtype: String,

    /// Data format: auto, csv, or json
    #[arg(short, long, default_value = "auto")]
    format: String,
}

#[derive(Args)]
struct CvOpts {
    /// Number of outer folds
    #[arg(long, default_value = "10")]
    folds: usize,

    /// Number of inner folds for parameter tuning
    #[arg(long, default_value = "3")]
    tuning_folds: usize,

    /// Build one kernel over all samples (faster, slightly optimistic)
    #[arg(long)]
    project_all: bool,

    /// Keep samples in file order when forming folds
    #[arg(long)]
    no_shuffle: bool,

    /// Seed for fold shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Preserve class proportions in each fold
    #[arg(long)]
    stratified: bool,

    /// Worker threads for fold evaluation
    #[arg(long, default_value = "0")]
    cv_threads: usize,

    /// Kernel family
    #[arg(long, default_value = "gaussian")]
    kernel: String,

    /// Candidate C values, comma separated
    #[arg(long, value_delimiter = ',')]
    c_vals: Option<Vec<f64>>,

    /// Candidate bandwidth multipliers, comma separated
    #[arg(long, value_delimiter = ',')]
    gamma_scales: Option<Vec<f64>>,
}

#[derive(Args)]
struct DivsArgs {
    /// Bag data file
    #[arg(long)]
    data: PathBuf,

    /// Second bag file; divergences go from every bag of --data to every bag of it
    #[arg(long)]
    against: Option<PathBuf>,

    /// Divergence functions, e.g. renyi:.9, hellinger, l2
    #[arg(long = "div-func", default_value = "renyi:.9")]
    div_funcs: Vec<String>,

    /// Output JSON file (prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    estimator: EstimatorOpts,
}

#[derive(Args)]
struct CvArgs {
    /// Bag data file
    #[arg(long)]
    data: PathBuf,

    /// Divergence function
    #[arg(long = "div-func", default_value = "renyi:.9")]
    div_func: String,

    /// Treat labels as real-valued targets even if they are whole numbers
    #[arg(long)]
    regression: bool,

    /// Output JSON report (prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    estimator: EstimatorOpts,

    #[command(flatten)]
    cv: CvOpts,
}

#[derive(Args)]
struct CvDivsArgs {
    /// JSON file with `divs` and `labels`
    #[arg(long)]
    divs: PathBuf,

    /// JSON file with solver options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Treat labels as real-valued targets even if they are whole numbers
    #[arg(long)]
    regression: bool,

    /// Output JSON report (prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    cv: CvOpts,
}

#[derive(Args)]
struct PredictArgs {
    /// Labeled training bags
    #[arg(long)]
    train: PathBuf,

    /// Bags to predict; their labels are ignored
    #[arg(long)]
    test: PathBuf,

    /// Divergence function
    #[arg(long = "div-func", default_value = "renyi:.9")]
    div_func: String,

    /// Build the kernel over training and test bags together
    #[arg(long)]
    transduct: bool,

    /// Treat labels as real-valued targets even if they are whole numbers
    #[arg(long)]
    regression: bool,

    /// Include confidence scores
    #[arg(long)]
    confidence: bool,

    /// Output JSON file (prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    estimator: EstimatorOpts,

    #[command(flatten)]
    cv: CvOpts,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Divs(args) => divs_command(args),
        Commands::Cv(args) => cv_command(args),
        Commands::CvDivs(args) => cv_divs_command(args),
        Commands::Predict(args) => predict_command(args),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn load_options(config: Option<&Path>) -> Result<Options> {
    match config {
        Some(path) => {
            info!("Loading options from: {path:?}");
            Options::from_json(&fs::read_to_string(path)?)
        }
        None => Ok(Options::default()),
    }
}

impl EstimatorOpts {
    fn options(&self) -> Result<Options> {
        let mut options = load_options(self.config.as_deref())?;
        if let Some(k) = self.k {
            options = options.with_k(k);
        }
        if let Some(n) = self.num_threads {
            options = options.with_num_threads(n);
        }
        Ok(options)
    }

    fn dtype(&self) -> Result<ScalarKind> {
        let kind: ScalarKind = self.dtype.parse()?;
        if !kind.is_bag_kind() {
            return Err(SdmError::UnsupportedScalarType(format!(
                "{kind} cannot hold bag values; use f32 or f64"
            )));
        }
        Ok(kind)
    }

    fn load(&self, path: &Path) -> Result<BagDataset> {
        let format = if self.format == "auto" {
            detect_format(path)
        } else {
            self.format.clone()
        };
        info!("Loading {path:?} as {format}");
        let dataset = match format.as_str() {
            "csv" => CsvBags::from_file(path)?,
            "json" => JsonBags::from_file(path)?,
            _ => {
                return Err(SdmError::InvalidParameter(format!(
                    "Unsupported format: {format}. Use 'csv' or 'json'"
                )))
            }
        };
        info!(
            "Loaded {} bags of dimension {}",
            dataset.len(),
            dataset.dim()
        );
        Ok(dataset)
    }
}

impl CvOpts {
    fn params(&self) -> Result<CvParams> {
        let mut params = CvParams::default()
            .with_folds(self.folds)
            .with_tuning_folds(self.tuning_folds)
            .with_project_all(self.project_all)
            .with_shuffle(!self.no_shuffle)
            .with_stratified(self.stratified)
            .with_cv_threads(self.cv_threads)
            .with_kernel(self.kernel.parse()?);
        if let Some(seed) = self.seed {
            params = params.with_seed(seed);
        }
        if let Some(c_vals) = &self.c_vals {
            params = params.with_c_vals(c_vals.clone());
        }
        if let Some(scales) = &self.gamma_scales {
            params = params.with_gamma_scales(scales.clone());
        }
        Ok(params)
    }
}

fn task_for(dataset_task: Task, regression: bool) -> Task {
    if regression {
        Task::Regression
    } else {
        dataset_task
    }
}

fn narrow(bags: &[Bag<f64>]) -> Result<Vec<Bag<f32>>> {
    bags.iter()
        .map(|b| Bag::new(b.as_slice().iter().map(|&v| v as f32).collect(), b.dim()))
        .collect()
}

/// Print JSON to stdout or write it to `output`
fn emit<S: Serialize>(value: &S, output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, text)?;
            info!("Output saved to: {path:?}");
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Serialize)]
struct DivsOutput {
    timestamp: String,
    div_funcs: Vec<String>,
    shape: [usize; 3],
    /// One matrix per divergence function; NaN entries are null
    divs: Vec<Vec<Vec<Option<f64>>>>,
}

fn divs_command(args: DivsArgs) -> Result<()> {
    let options = args.estimator.options()?;
    let funcs = parse_div_funcs(&args.div_funcs)?;
    let x = args.estimator.load(&args.data)?;
    let y = args
        .against
        .as_deref()
        .map(|p| args.estimator.load(p))
        .transpose()?;

    let divs = match args.estimator.dtype()? {
        ScalarKind::F32 => {
            let y32 = y.as_ref().map(|d| narrow(d.bags())).transpose()?;
            get_divs(&narrow(x.bags())?, y32.as_deref(), &funcs, &options)?
        }
        _ => get_divs(x.bags(), y.as_ref().map(|d| d.bags()), &funcs, &options)?,
    };

    let (m, nx, ny) = divs.shape();
    let output = DivsOutput {
        timestamp: timestamp(),
        div_funcs: funcs.iter().map(DivFunc::to_string).collect(),
        shape: [m, nx, ny],
        divs: (0..m)
            .map(|f| {
                JsonDivs::from_matrix(&divs.functional(f), Vec::new()).divs
            })
            .collect(),
    };
    emit(&output, args.output.as_deref())
}

#[derive(Serialize)]
struct CvOutput<'a> {
    timestamp: String,
    source: String,
    task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    div_func: Option<String>,
    score_std: f64,
    #[serde(flatten)]
    report: &'a CvReport,
}

fn print_cv_summary(report: &CvReport, task: Task) {
    let metric = match task {
        Task::Classification => "accuracy",
        Task::Regression => "RMSE",
    };
    info!(
        "CV {metric}: {:.4} (std {:.4}) over {} folds",
        report.score,
        report.score_std(),
        report.fold_scores.len()
    );
    if report.failed_solver_runs > 0 {
        warn!(
            "{} solver runs hit the iteration limit",
            report.failed_solver_runs
        );
    }
}

fn cv_on_bags<T: Scalar>(
    bags: &[Bag<T>],
    dataset: &BagDataset,
    task: Task,
    cv: &CvParams,
    div_func: DivFunc,
    options: &Options,
) -> Result<CvReport> {
    match task {
        Task::Classification => {
            crossvalidate(bags, &dataset.labels_as::<i64>(), cv, div_func, options)
        }
        Task::Regression => crossvalidate(bags, dataset.labels(), cv, div_func, options),
    }
}

fn cv_command(args: CvArgs) -> Result<()> {
    let options = args.estimator.options()?;
    let div_func: DivFunc = args.div_func.parse()?;
    let cv = args.cv.params()?;
    let dataset = args.estimator.load(&args.data)?;
    let task = task_for(dataset.infer_task(), args.regression);

    let report = match args.estimator.dtype()? {
        ScalarKind::F32 => cv_on_bags(&narrow(dataset.bags())?, &dataset, task, &cv, div_func, &options)?,
        _ => cv_on_bags(dataset.bags(), &dataset, task, &cv, div_func, &options)?,
    };
    print_cv_summary(&report, task);

    emit(
        &CvOutput {
            timestamp: timestamp(),
            source: args.data.display().to_string(),
            task,
            div_func: Some(div_func.to_string()),
            score_std: report.score_std(),
            report: &report,
        },
        args.output.as_deref(),
    )
}

fn cv_divs_command(args: CvDivsArgs) -> Result<()> {
    let options = load_options(args.config.as_deref())?;
    let cv = args.cv.params()?;
    let (divs, labels) = JsonDivs::from_file(&args.divs)?;
    let integral = labels.iter().all(|v| v.fract() == 0.0);
    let task = if integral && !args.regression {
        Task::Classification
    } else {
        Task::Regression
    };

    let report = match task {
        Task::Classification => {
            let labels: Vec<i64> = labels.iter().map(|&v| <i64 as Label>::from_f64(v)).collect();
            crossvalidate_divs(&divs, &labels, &cv, &options)?
        }
        Task::Regression => crossvalidate_divs(&divs, &labels, &cv, &options)?,
    };
    print_cv_summary(&report, task);

    emit(
        &CvOutput {
            timestamp: timestamp(),
            source: args.divs.display().to_string(),
            task,
            div_func: None,
            score_std: report.score_std(),
            report: &report,
        },
        args.output.as_deref(),
    )
}

#[derive(Serialize)]
struct PredictedBag {
    id: String,
    label: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
}

#[derive(Serialize)]
struct PredictOutput {
    timestamp: String,
    task: Task,
    transductive: bool,
    predictions: Vec<PredictedBag>,
}

/// Labels for `test` from a model trained on `train`; confidences when available
fn predict_labels<T: Scalar, L: Label>(
    train: Vec<Bag<T>>,
    labels: &[L],
    test: &[Bag<T>],
    args: &PredictArgs,
    cv: &CvParams,
    options: &Options,
) -> Result<Vec<(f64, Option<f64>)>> {
    let div_func: DivFunc = args.div_func.parse()?;
    if args.transduct {
        let predicted = transduct(&train, labels, test, div_func, cv, options)?;
        return Ok(predicted.into_iter().map(|l| (l.to_f64(), None)).collect());
    }
    let model = Sdm::train(train, labels, div_func, cv, options)?;
    info!("Selected C={}, gamma={:.6}", model.c(), model.gamma());
    Ok(model
        .predict_many(test)?
        .into_iter()
        .map(|p| {
            let confidence = p.confidence();
            (p.label, Some(confidence))
        })
        .collect())
}

fn predict_for<T: Scalar>(
    train: Vec<Bag<T>>,
    test: &[Bag<T>],
    dataset: &BagDataset,
    task: Task,
    args: &PredictArgs,
    cv: &CvParams,
    options: &Options,
) -> Result<Vec<(f64, Option<f64>)>> {
    match task {
        Task::Classification => {
            predict_labels(train, &dataset.labels_as::<i64>(), test, args, cv, options)
        }
        Task::Regression => predict_labels(train, dataset.labels(), test, args, cv, options),
    }
}

fn predict_command(args: PredictArgs) -> Result<()> {
    let options = args.estimator.options()?;
    let cv = args.cv.params()?;
    let train = args.estimator.load(&args.train)?;
    let test = args.estimator.load(&args.test)?;
    let task = task_for(train.infer_task(), args.regression);

    let predicted = match args.estimator.dtype()? {
        ScalarKind::F32 => predict_for(
            narrow(train.bags())?,
            &narrow(test.bags())?,
            &train,
            task,
            &args,
            &cv,
            &options,
        )?,
        _ => predict_for(
            train.bags().to_vec(),
            test.bags(),
            &train,
            task,
            &args,
            &cv,
            &options,
        )?,
    };

    let output = PredictOutput {
        timestamp: timestamp(),
        task,
        transductive: args.transduct,
        predictions: test
            .ids()
            .iter()
            .zip(predicted)
            .map(|(id, (label, confidence))| PredictedBag {
                id: id.clone(),
                label,
                confidence: confidence.filter(|_| args.confidence),
            })
            .collect(),
    };
    emit(&output, args.output.as_deref())
}

fn detect_format(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => "json".to_string(),
        Some("csv") => "csv".to_string(),
        _ => {
            warn!("Unknown file extension, assuming CSV format");
            "csv".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(detect_format(&PathBuf::from("bags.csv")), "csv");
        assert_eq!(detect_format(&PathBuf::from("bags.json")), "json");
        assert_eq!(detect_format(&PathBuf::from("bags")), "csv");
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "rsdm",
            "cv",
            "--data",
            "bags.csv",
            "--folds",
            "5",
            "--c-vals",
            "1,10",
            "--seed",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Cv(args) => {
                let cv = args.cv.params().unwrap();
                assert_eq!(cv.folds, 5);
                assert_eq!(cv.c_vals, Some(vec![1.0, 10.0]));
                assert_eq!(cv.seed, Some(3));
            }
            _ => panic!("expected cv subcommand"),
        }
    }

    #[test]
    fn test_integer_dtype_rejected() {
        let opts = EstimatorOpts {
            config: None,
            k: None,
            num_threads: None,
            dtype: "i32".to_string(),
            format: "auto".to_string(),
        };
        assert!(matches!(
            opts.dtype(),
            Err(SdmError::UnsupportedScalarType(_))
        ));
    }
}
