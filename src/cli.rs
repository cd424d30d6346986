//! Argument parsing and command dispatch.

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use osteoscale_core::errors::OsteoscaleError;
use osteoscale_core::kinematics::BodyTree;
use osteoscale_core::mjcf::MjcfDocument;
use osteoscale_core::morphometry::SegmentTable;
use osteoscale_core::scaling::{measure, rescale, MeshRename, RescalePlan};
use osteoscale_core::trajectory::{
    apply_z_offset, clip_joint_angles, extract_clips, save_clips, PreprocessConfig, QposTrajectory,
};
use osteoscale_params::errors::ParamsError;
use osteoscale_params::{FitParameters, KeypointTable};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as Process;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] OsteoscaleError),
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid segment table: {0}")]
    Segments(#[from] serde_yaml::Error),
    #[error("invalid --rename-mesh value '{0}', expected FROM=TO")]
    RenameMesh(String),
    #[error("viewer command '{command}' exited with {status}")]
    Viewer { command: String, status: String },
}

#[derive(Parser, Debug)]
#[command(
    name = "osteoscale",
    version,
    about = "Rescale articulated rodent skeletal models to literature morphometrics"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rescale a model's bone segments to literature lengths
    Scale {
        /// Input MJCF model
        input: PathBuf,
        /// Where to write the adjusted model
        output: PathBuf,
        /// Fitting parameter YAML (scale factor and unit conversion are
        /// taken from here)
        #[arg(long)]
        params: Option<PathBuf>,
        /// Segment table YAML overriding the built-in rat table
        #[arg(long)]
        segments: Option<PathBuf>,
        /// Mesh filename substitution, as FROM=TO
        #[arg(long)]
        rename_mesh: Option<String>,
        /// Launch this viewer command on the written model
        #[arg(long)]
        view: Option<String>,
    },
    /// Measure rest-pose segment lengths without modifying the model
    Measure {
        /// Input MJCF model
        input: PathBuf,
        /// Segment table YAML overriding the built-in rat table
        #[arg(long)]
        segments: Option<PathBuf>,
    },
    /// Preprocess a reference qpos trajectory into training clips
    Preprocess {
        /// Input trajectory (bincode, written by this tool)
        qpos: PathBuf,
        /// Where to write the clips (bincode)
        output: PathBuf,
        /// Model whose joint ranges clamp the reference angles
        #[arg(long)]
        model: Option<PathBuf>,
        /// Frames per clip
        #[arg(long)]
        clip_length: Option<usize>,
        /// Maximum joint velocity, rad/s
        #[arg(long)]
        max_qvel: Option<f64>,
        /// Subtract this floor offset from the root height
        #[arg(long)]
        z_offset: Option<f64>,
        /// Report every meaningful clamp
        #[arg(long)]
        verbatim: bool,
    },
    /// Write a default parameter table as YAML
    ExportParams {
        /// Which table to write
        #[arg(value_enum)]
        table: ParamsTable,
        /// Output YAML path
        output: PathBuf,
    },
}

#[derive(ValueEnum, Copy, Clone, Debug)]
pub enum ParamsTable {
    Fit,
    Keypoints,
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Scale {
            input,
            output,
            params,
            segments,
            rename_mesh,
            view,
        } => scale(input, output, params, segments, rename_mesh, view),
        Command::Measure { input, segments } => measure_only(input, segments),
        Command::Preprocess {
            qpos,
            output,
            model,
            clip_length,
            max_qvel,
            z_offset,
            verbatim,
        } => preprocess(qpos, output, model, clip_length, max_qvel, z_offset, verbatim),
        Command::ExportParams { table, output } => export_params(table, output),
    }
}

fn scale(
    input: PathBuf,
    output: PathBuf,
    params: Option<PathBuf>,
    segments: Option<PathBuf>,
    rename_mesh: Option<String>,
    view: Option<String>,
) -> Result<(), CliError> {
    let params = load_params(params)?;
    let plan = RescalePlan {
        global_scale: params.scale_factor,
        mm_to_model: params.mm_to_meters,
        segments: load_segments(segments)?,
        mesh_rename: rename_mesh.map(parse_rename).transpose()?,
        ..RescalePlan::default()
    };

    let mut doc = MjcfDocument::from_file(&input)?;
    let report = rescale(&mut doc, &plan)?;
    doc.write_file(&output)?;

    print!("{report}");
    if report.is_converged() {
        info!("wrote {}", output.display());
    } else {
        warn!(
            "residuals did not vanish (max {:.3e}); check the segment part sets",
            report.max_residual()
        );
    }

    if let Some(command) = view {
        launch_viewer(&command, &output)?;
    }
    Ok(())
}

fn measure_only(input: PathBuf, segments: Option<PathBuf>) -> Result<(), CliError> {
    let doc = MjcfDocument::from_file(&input)?;
    let table = load_segments(segments)?;
    for length in measure(&doc, &table)? {
        println!("{}: {:.6}", length.segment, length.length);
    }
    Ok(())
}

fn preprocess(
    qpos: PathBuf,
    output: PathBuf,
    model: Option<PathBuf>,
    clip_length: Option<usize>,
    max_qvel: Option<f64>,
    z_offset: Option<f64>,
    verbatim: bool,
) -> Result<(), CliError> {
    let mut config = PreprocessConfig {
        verbatim,
        ..PreprocessConfig::default()
    };
    if let Some(clip_length) = clip_length {
        config.clip_length = clip_length;
    }
    if let Some(max_qvel) = max_qvel {
        config.max_qvel = max_qvel;
    }

    let mut trajectory = QposTrajectory::load(&qpos)?;
    info!(
        "loaded {} frames of width {}",
        trajectory.len(),
        trajectory.width()
    );

    if let Some(model) = model {
        let doc = MjcfDocument::from_file(&model)?;
        let tree = BodyTree::from_document(&doc)?;
        let clamped = clip_joint_angles(&mut trajectory, tree.joints(), config.verbatim)?;
        if clamped > 0 {
            info!("clamped {clamped} joint angles to model ranges");
        }
    }
    if let Some(z_offset) = z_offset {
        apply_z_offset(&mut trajectory, z_offset);
    }

    let clips = extract_clips(&trajectory, &config)?;
    save_clips(&clips, &output)?;
    println!("wrote {} clips to {}", clips.len(), output.display());
    Ok(())
}

fn export_params(table: ParamsTable, output: PathBuf) -> Result<(), CliError> {
    match table {
        ParamsTable::Fit => FitParameters::default().to_yaml_file(&output)?,
        ParamsTable::Keypoints => KeypointTable::default().to_yaml_file(&output)?,
    }
    println!("wrote {}", output.display());
    Ok(())
}

fn load_params(path: Option<PathBuf>) -> Result<FitParameters, CliError> {
    match path {
        Some(path) => Ok(FitParameters::from_yaml_file(path)?),
        None => Ok(FitParameters::default()),
    }
}

fn load_segments(path: Option<PathBuf>) -> Result<SegmentTable, CliError> {
    match path {
        Some(path) => Ok(serde_yaml::from_str(&fs::read_to_string(path)?)?),
        None => Ok(SegmentTable::default()),
    }
}

fn parse_rename(value: String) -> Result<MeshRename, CliError> {
    match value.split_once('=') {
        Some((from, to)) if !from.is_empty() => Ok(MeshRename {
            from: from.to_string(),
            to: to.to_string(),
        }),
        _ => Err(CliError::RenameMesh(value)),
    }
}

fn launch_viewer(command: &str, model: &Path) -> Result<(), CliError> {
    info!("launching viewer: {command} {}", model.display());
    let status = Process::new(command).arg(model).status()?;
    if !status.success() {
        return Err(CliError::Viewer {
            command: command.to_string(),
            status: status.to_string(),
        });
    }
    Ok(())
}
