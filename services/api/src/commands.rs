use crate::assess::{run_assessment, Assessment, AssessmentRequest, FlyerSource};
use crate::infra::{blocking, media_type_for};
use clap::Args;
use minpaku_feasibility::config::AppConfig;
use minpaku_feasibility::error::AppError;
use minpaku_feasibility::telemetry;
use minpaku_feasibility::workflows::address::{prefecture_of, AddressForms, SearchLevel};
use minpaku_feasibility::workflows::geocode::GeoCoordinate;
use minpaku_feasibility::workflows::ocr::is_valid_address;
use minpaku_feasibility::workflows::session::{MarketOutcome, SessionServices};
use minpaku_feasibility::workflows::simulation::{simulate, yen, SimulationParams};
use minpaku_feasibility::workflows::zoning::{zoning_info, ZoningLookupEngine, ZoningOutcome};
use std::fs;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct AssessArgs {
    /// Flyer image or PDF to read with OCR
    #[arg(long, conflicts_with = "text")]
    pub(crate) image: Option<PathBuf>,
    /// Flyer already converted to plain text
    #[arg(long)]
    pub(crate) text: Option<PathBuf>,
    /// Property address; overrides the one read from the flyer
    #[arg(long)]
    pub(crate) address: Option<String>,
    /// Floor area in square meters
    #[arg(long)]
    pub(crate) area: Option<f64>,
    /// Stop after the legal determination
    #[arg(long)]
    pub(crate) skip_economics: bool,
    /// Write the simulation table to this CSV file
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct SimulateArgs {
    /// JSON file with simulation parameters; unset fields keep their defaults
    #[arg(long)]
    pub(crate) params: Option<PathBuf>,
    /// Nightly rate in yen
    #[arg(long)]
    pub(crate) daily_rate: Option<f64>,
    /// Monthly rent in yen
    #[arg(long)]
    pub(crate) rent: Option<u64>,
    /// Total one-time costs in yen, booked as furniture
    #[arg(long)]
    pub(crate) initial: Option<u64>,
    /// Occupancy rates to tabulate, e.g. `--occupancy 0.5 --occupancy 0.7`
    #[arg(long)]
    pub(crate) occupancy: Vec<f64>,
    /// Write the table to this CSV file
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ZoningLookupArgs {
    #[arg(long, allow_hyphen_values = true)]
    pub(crate) lat: f64,
    #[arg(long, allow_hyphen_values = true)]
    pub(crate) lon: f64,
    /// Prefecture hint such as 東京都; narrows the files scanned
    #[arg(long)]
    pub(crate) prefecture: Option<String>,
    /// Dataset directory; defaults to ZONING_DATA_DIR
    #[arg(long)]
    pub(crate) data_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct AddressArgs {
    pub(crate) address: String,
}

pub(crate) async fn run_assessment_command(args: AssessArgs) -> Result<(), AppError> {
    let AssessArgs {
        image,
        text,
        address,
        area,
        skip_economics,
        csv,
    } = args;

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let flyer = match (image, text) {
        (Some(path), _) => FlyerSource::Image {
            bytes: fs::read(&path)?,
            media_type: media_type_for(&path),
        },
        (None, Some(path)) => FlyerSource::Text(fs::read_to_string(&path)?),
        (None, None) => FlyerSource::Absent,
    };
    let request = AssessmentRequest {
        flyer,
        address,
        area_m2: area,
        include_economics: !skip_economics,
    };

    let assessment = blocking(move || {
        let services = SessionServices::from_config(&config)?;
        run_assessment(services, request)
    })
    .await?;

    render_assessment(&assessment);
    if let (Some(path), Some(economics)) = (csv, assessment.economics.as_ref()) {
        economics
            .simulation
            .write_csv(fs::File::create(&path)?)
            .map_err(std::io::Error::from)?;
        println!("\nシミュレーション結果を {} に保存しました", path.display());
    }
    Ok(())
}

fn render_assessment(assessment: &Assessment) {
    let report = &assessment.report;
    println!("民泊開業 適法性・収益性レポート");
    if let Some(extracted) = &assessment.extracted_address {
        if extracted != &report.address {
            println!("- チラシから抽出した住所: {extracted}");
        }
    }
    println!(
        "- 所在地: {} ({:.6}, {:.6} / {})",
        report.address,
        report.geocode.coordinate.latitude,
        report.geocode.coordinate.longitude,
        report.geocode.provider
    );
    println!("- 用途地域: {}", report.zoning_type());
    if let Some(reason) = &report.facts_error {
        println!("- 物件情報の抽出に失敗しました: {reason}");
    }
    let failed = report.legal.failed_statutes();
    if !failed.is_empty() {
        let labels: Vec<&str> = failed.iter().map(|statute| statute.label()).collect();
        println!("- 判定できなかった法令: {}", labels.join("、"));
    }

    println!("\n{}", report.formatted_report);
    println!("\n## 次に取るべきアクション\n{}", report.next_actions.text);

    if let Some(economics) = &assessment.economics {
        println!("\n## 収益シミュレーション");
        match &economics.market {
            MarketOutcome::Estimated(estimate) if estimate.found_listings() => println!(
                "- 想定単価: {} (価格帯 {}, {}件)",
                estimate.median_label, estimate.price_range, estimate.sample_count
            ),
            MarketOutcome::Estimated(_) => println!("- 周辺の掲載が見つからないため既定単価を使用します"),
            MarketOutcome::Failed {
                reason,
                quota_exhausted,
            } => {
                let note = if *quota_exhausted { " (利用上限)" } else { "" };
                println!("- 単価推定に失敗しました{note}: {reason}");
            }
        }
        println!("- 使用単価: {}", yen(economics.daily_rate));
        println!("- 初期費用合計: {}", yen(economics.simulation.initial_total as f64));
        println!(
            "- 月額運営費: {}",
            yen(economics.costs.operating.monthly_total() as f64)
        );
        println!(
            "- 損益分岐稼働率: {:.1}%",
            economics.simulation.breakeven_occupancy * 100.0
        );
        println!("\n{}", economics.simulation.markdown_table());
        for note in &economics.recommendations {
            println!("- {note}");
        }
    }

    println!("\n## 処理時間");
    for stage in &assessment.stage_timings {
        println!("- {}: {:.0}ms", stage.stage, stage.total_ms);
    }
}

pub(crate) fn run_simulation(args: SimulateArgs) -> Result<(), AppError> {
    let SimulateArgs {
        params,
        daily_rate,
        rent,
        initial,
        occupancy,
        csv,
    } = args;

    let mut params = match params {
        Some(path) => serde_json::from_str::<SimulationParams>(&fs::read_to_string(&path)?)
            .map_err(|err| AppError::InvalidInput(format!("{}: {err}", path.display())))?,
        None => SimulationParams::default(),
    };
    if let Some(rate) = daily_rate {
        params.daily_rate = rate;
    }
    if let Some(rent) = rent {
        params.operating_costs.rent = rent;
    }
    if let Some(initial) = initial {
        params.initial_costs.furniture = initial;
    }
    if !occupancy.is_empty() {
        params.occupancy_rates = occupancy;
    }
    validate_simulation(&params)?;

    let result = simulate(&params);
    println!("初期費用合計: {}", yen(result.initial_total as f64));
    println!("年間運営費: {}", yen(result.annual_operating_cost));
    println!("損益分岐稼働率: {:.1}%\n", result.breakeven_occupancy * 100.0);
    println!("{}", result.markdown_table());
    for note in result.recommendations() {
        println!("- {note}");
    }

    if let Some(path) = csv {
        result
            .write_csv(fs::File::create(&path)?)
            .map_err(std::io::Error::from)?;
        println!("\nCSVを {} に保存しました", path.display());
    }
    Ok(())
}

/// Rejects rates the simulation cannot interpret.
/// One trillion yen; anything larger is a typo, not a property.
const MAX_AMOUNT: u64 = 1_000_000_000_000;

pub(crate) fn validate_simulation(params: &SimulationParams) -> Result<(), AppError> {
    let amounts = params
        .initial_costs
        .items()
        .into_iter()
        .chain(params.operating_costs.items());
    for (label, amount) in amounts {
        if amount > MAX_AMOUNT {
            return Err(AppError::InvalidInput(format!(
                "{label} must not exceed {MAX_AMOUNT} yen, got {amount}"
            )));
        }
    }
    if !params.daily_rate.is_finite() || params.daily_rate < 0.0 {
        return Err(AppError::InvalidInput(format!(
            "daily_rate must be a non-negative number, got {}",
            params.daily_rate
        )));
    }
    if let Some(rate) = params
        .occupancy_rates
        .iter()
        .find(|rate| !(0.0..=1.0).contains(*rate))
    {
        return Err(AppError::InvalidInput(format!(
            "occupancy rates must be between 0 and 1, got {rate}"
        )));
    }
    let shares = [
        ("tax_rate", params.tax_rate),
        ("commission_rate", params.effective_commission_rate()),
    ];
    if let Some((name, value)) = shares
        .iter()
        .find(|(_, value)| !(0.0..=1.0).contains(value))
    {
        return Err(AppError::InvalidInput(format!(
            "{name} must be between 0 and 1, got {value}"
        )));
    }
    Ok(())
}

pub(crate) fn run_zoning_lookup(args: ZoningLookupArgs) -> Result<(), AppError> {
    let ZoningLookupArgs {
        lat,
        lon,
        prefecture,
        data_dir,
    } = args;

    let data_dir = match data_dir {
        Some(dir) => dir,
        None => AppConfig::load()?.zoning.data_dir,
    };
    let coordinate = GeoCoordinate::new(lat, lon)?;
    let engine = ZoningLookupEngine::from_data_dir(&data_dir);

    match engine.lookup(coordinate, prefecture.as_deref()) {
        ZoningOutcome::Found(found) => {
            let info = zoning_info(&found.zoning_type);
            println!("用途地域: {} (コード {})", found.zoning_type, found.zoning_code);
            println!("- {}", info.description);
            println!("- 建物の高さ制限: {}", info.building_height_limit);
            println!("- 容積率: {}", info.floor_area_ratio);
            println!("- 用途制限: {}", info.land_use_restrictions);
            println!("- データ: {}", found.source_dataset.display());
        }
        ZoningOutcome::NotFound(miss) => {
            println!("用途地域が見つかりませんでした: {}", miss.reason);
            println!("- 確認したファイル数: {}", miss.files_checked);
            for file in &miss.sample_files {
                println!("  - {}", file.display());
            }
        }
    }
    Ok(())
}

pub(crate) fn run_address_normalize(args: AddressArgs) -> Result<(), AppError> {
    let forms = AddressForms::new(&args.address);
    if forms.raw.is_empty() {
        return Err(AppError::InvalidInput("address is empty".to_string()));
    }

    println!("入力: {}", forms.raw);
    println!(
        "都道府県: {}",
        prefecture_of(&forms.raw).unwrap_or("不明")
    );
    println!("住所として有効: {}", if is_valid_address(&forms.raw) { "はい" } else { "いいえ" });
    for level in SearchLevel::ordered() {
        println!("- {}: {}", level.label(), forms.for_level(level));
    }
    Ok(())
}
