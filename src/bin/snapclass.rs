//! Command-line front end for the snapclass client core.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use snapclass::{
    api::ApiClient,
    app_dirs,
    capture::{CaptureOrchestrator, CaptureSettings},
    catalog::{self, Catalog, ClassificationView},
    config::{self, ClientConfig},
    dataset::{Architecture, ImageRef, ModelCategory},
    device::{self, HttpRemoteDevice, RemoteDevice},
    logging,
    media::{ImageReencoder, PathListPicker},
    notification::{Notification, NotificationKind},
    session::{SessionController, SessionTokenStore},
    training::{SubmitOutcome, TrainingController},
};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(command) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    if let Err(err) = logging::init_with_default_filter("warn") {
        eprintln!("Logging unavailable: {err}");
    }
    let config = config::load_or_default().map_err(|err| err.to_string())?;
    match command {
        Command::Login { email, password } => login(&config, &email, &password),
        Command::Logout => {
            let mut session = session_controller(&config)?;
            session.logout();
            println!("Logged out.");
            Ok(())
        }
        Command::Models { category, search } => list_models(&config, &category, &search),
        Command::Classes { model_id } => {
            let api = ApiClient::from_config(&config);
            let details = catalog::load_model_classes(&api, &model_id, &model_id)
                .map_err(|err| err.user_message("Failed to load model classes"))?;
            println!("{}", details.name);
            if !details.description.is_empty() {
                println!("{}", details.description);
            }
            for class in &details.classes {
                println!("  {class}");
            }
            Ok(())
        }
        Command::Classify { model_id, image } => classify(&config, &model_id, image),
        Command::Train { manifest } => train(&config, &manifest),
        Command::DeviceCapture { out_dir } => {
            std::fs::create_dir_all(&out_dir)
                .map_err(|err| format!("Create {} failed: {err}", out_dir.display()))?;
            let device = HttpRemoteDevice::from_config(&config);
            let bytes = device.capture().map_err(|err| format!("Failed: {err}"))?;
            let image = device::save_captured_image(&bytes, &out_dir)
                .map_err(|err| format!("Failed: {err}"))?;
            println!("{}", image.location().display());
            Ok(())
        }
        Command::DeviceBatch { out_dir } => {
            std::fs::create_dir_all(&out_dir)
                .map_err(|err| format!("Create {} failed: {err}", out_dir.display()))?;
            let device = HttpRemoteDevice::from_config(&config);
            let archive = device.fetch_dataset().map_err(|err| format!("Failed: {err}"))?;
            let images = device::archive::unpack_batch(&archive, &out_dir)
                .map_err(|err| format!("Failed: {err}"))?;
            println!("Captured {} images from Raspberry Pi", images.len());
            for image in &images {
                println!("  {}", image.location().display());
            }
            Ok(())
        }
    }
}

fn session_controller(
    config: &ClientConfig,
) -> Result<SessionController<SessionTokenStore>, String> {
    let store = SessionTokenStore::new().map_err(|err| err.to_string())?;
    Ok(SessionController::new(ApiClient::from_config(config), store))
}

fn login(config: &ClientConfig, email: &str, password: &str) -> Result<(), String> {
    let mut session = session_controller(config)?;
    let route = session.login(email, password);
    let notes = session.notifications().drain();
    report(&notes);
    match route {
        Some(_) => Ok(()),
        None => Err("Login failed".to_string()),
    }
}

fn list_models(config: &ClientConfig, category: &str, search: &str) -> Result<(), String> {
    let mut catalog = Catalog::new(ApiClient::from_config(config));
    if !catalog.refresh() {
        report(&catalog.notifications().drain());
        return Err("Failed to load models".to_string());
    }
    let models = catalog.filtered(category, search);
    if models.is_empty() {
        println!("No models found.");
    }
    for model in models {
        println!("{}\t{}\t{}", model.id, model.category, model.name);
    }
    Ok(())
}

fn classify(config: &ClientConfig, model_id: &str, image: PathBuf) -> Result<(), String> {
    let mut view = ClassificationView::open(ApiClient::from_config(config), model_id, model_id);
    view.select_image(image);
    let classified = view.classify();
    report(&view.notifications().drain());
    if !classified {
        return Err("Classification failed".to_string());
    }
    for row in view.rows() {
        let marker = if row.selected { "*" } else { " " };
        println!(
            "{marker} {}\t{}",
            row.label,
            row.confidence.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Dataset description read by `train`.
#[derive(Debug, Deserialize)]
struct TrainManifest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    architecture: Option<String>,
    #[serde(default)]
    classes: Vec<ManifestClass>,
}

#[derive(Debug, Deserialize)]
struct ManifestClass {
    name: String,
    #[serde(default)]
    images: Vec<PathBuf>,
}

fn train(config: &ClientConfig, manifest_path: &Path) -> Result<(), String> {
    let text = std::fs::read_to_string(manifest_path)
        .map_err(|err| format!("Read {} failed: {err}", manifest_path.display()))?;
    let manifest: TrainManifest = toml::from_str(&text)
        .map_err(|err| format!("Invalid manifest {}: {err}", manifest_path.display()))?;
    let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let cache_dir = app_dirs::cache_dir().map_err(|err| err.to_string())?;
    let capture = CaptureOrchestrator::new(
        Arc::new(PathListPicker::default()),
        Arc::new(HttpRemoteDevice::from_config(config)),
        CaptureSettings::from_config(config, cache_dir),
    );
    let tokens = SessionTokenStore::new().map_err(|err| err.to_string())?;
    let mut controller = TrainingController::new(
        ApiClient::from_config(config),
        tokens,
        capture,
        Box::new(ImageReencoder),
        config.reencode_quality,
    );

    let dataset = controller.dataset_mut();
    dataset.name = manifest.name;
    dataset.description = manifest.description;
    if let Some(category) = manifest.category.as_deref() {
        dataset.category = ModelCategory::parse(category)
            .ok_or_else(|| format!("Unknown category: {category}"))?;
    }
    if let Some(architecture) = manifest.architecture.as_deref() {
        dataset.architecture = Architecture::parse(architecture)
            .ok_or_else(|| format!("Unknown architecture: {architecture}"))?;
    }
    while dataset.class_count() < manifest.classes.len() {
        dataset.add_class();
    }
    let ids: Vec<_> = dataset.classes().iter().map(|class| class.id).collect();
    for (id, class) in ids.into_iter().zip(manifest.classes) {
        dataset
            .rename_class(id, class.name)
            .map_err(|err| err.to_string())?;
        let images = class
            .images
            .into_iter()
            .map(|path| ImageRef::new(base_dir.join(path)));
        dataset
            .append_images(id, images)
            .map_err(|err| err.to_string())?;
    }

    let outcome = controller.submit();
    report(&controller.drain_notifications());
    match outcome {
        SubmitOutcome::Trained { response, .. } => {
            if let Some(message) = response.message {
                println!("{message}");
            }
            Ok(())
        }
        SubmitOutcome::Failed { message, .. } => Err(message),
        SubmitOutcome::NotLoggedIn => Err("Not logged in".to_string()),
        SubmitOutcome::Invalid(issues) => {
            Err(format!("Dataset has {} problem(s)", issues.len()))
        }
    }
}

fn report(notes: &[Notification]) {
    for note in notes {
        match note.kind {
            NotificationKind::Error | NotificationKind::Warning => eprintln!("{}", note.message),
            _ => println!("{}", note.message),
        }
    }
}

enum Command {
    Login { email: String, password: String },
    Logout,
    Models { category: String, search: String },
    Classes { model_id: String },
    Classify { model_id: String, image: PathBuf },
    Train { manifest: PathBuf },
    DeviceCapture { out_dir: PathBuf },
    DeviceBatch { out_dir: PathBuf },
}

fn parse_args(args: Vec<String>) -> Result<Option<Command>, String> {
    let Some(name) = args.first() else {
        println!("{}", help_text());
        return Ok(None);
    };
    let rest = &args[1..];
    let positional = |idx: usize, what: &str| -> Result<String, String> {
        rest.get(idx)
            .cloned()
            .ok_or_else(|| format!("{name} requires <{what}>\n\n{}", help_text()))
    };
    let command = match name.as_str() {
        "-h" | "--help" | "help" => {
            println!("{}", help_text());
            return Ok(None);
        }
        "login" => Command::Login {
            email: positional(0, "email")?,
            password: positional(1, "password")?,
        },
        "logout" => Command::Logout,
        "models" => {
            let mut category = catalog::ALL_CATEGORIES.to_string();
            let mut search = String::new();
            let mut idx = 0usize;
            while idx < rest.len() {
                match rest[idx].as_str() {
                    "--category" => {
                        idx += 1;
                        category = rest
                            .get(idx)
                            .cloned()
                            .ok_or_else(|| "--category requires a value".to_string())?;
                    }
                    "--search" => {
                        idx += 1;
                        search = rest
                            .get(idx)
                            .cloned()
                            .ok_or_else(|| "--search requires a value".to_string())?;
                    }
                    unknown => {
                        return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
                    }
                }
                idx += 1;
            }
            Command::Models { category, search }
        }
        "classes" => Command::Classes {
            model_id: positional(0, "model-id")?,
        },
        "classify" => Command::Classify {
            model_id: positional(0, "model-id")?,
            image: PathBuf::from(positional(1, "image")?),
        },
        "train" => Command::Train {
            manifest: PathBuf::from(positional(0, "manifest")?),
        },
        "device-capture" => Command::DeviceCapture {
            out_dir: PathBuf::from(positional(0, "out-dir")?),
        },
        "device-batch" => Command::DeviceBatch {
            out_dir: PathBuf::from(positional(0, "out-dir")?),
        },
        unknown => return Err(format!("Unknown command: {unknown}\n\n{}", help_text())),
    };
    Ok(Some(command))
}

fn help_text() -> String {
    [
        "snapclass",
        "",
        "Train and use image classifiers from the command line.",
        "",
        "Usage:",
        "  snapclass login <email> <password>",
        "  snapclass logout",
        "  snapclass models [--category <category>] [--search <text>]",
        "  snapclass classes <model-id>",
        "  snapclass classify <model-id> <image>",
        "  snapclass train <manifest.toml>",
        "  snapclass device-capture <out-dir>",
        "  snapclass device-batch <out-dir>",
        "",
        "The service and device URLs come from config.toml in the app directory,",
        "or from SNAPCLASS_API_URL and SNAPCLASS_DEVICE_URL.",
    ]
    .join("\n")
}
