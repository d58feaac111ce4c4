use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "vnmark-render", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the composition length computed by a dry run.
    Duration(SceneArgs),
    /// Render every frame and write the per-frame asset log as JSON.
    Assets(AssetsArgs),
    /// Render a single frame: its assets as JSON and optionally the top video still as PNG.
    Frame(FrameArgs),
}

#[derive(Args, Debug)]
struct SceneArgs {
    /// Cue sheet JSON.
    #[arg(long)]
    sheet: PathBuf,

    /// Render props JSON (fps, fileName, choices, assetsRoot).
    #[arg(long)]
    props: Option<PathBuf>,

    /// Frame rate; overrides props.
    #[arg(long)]
    fps: Option<u32>,

    /// Start scene; overrides props.
    #[arg(long)]
    file_name: Option<String>,

    /// Predetermined choice indices, comma separated; overrides props.
    #[arg(long, value_delimiter = ',')]
    choices: Option<Vec<usize>>,

    /// Base directory for relative media; defaults to the sheet's directory.
    #[arg(long)]
    assets_root: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AssetsArgs {
    #[command(flatten)]
    scene: SceneArgs,

    /// Output JSON path; stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write per-asset spans instead of per-frame snapshots.
    #[arg(long)]
    spans: bool,
}

#[derive(Args, Debug)]
struct FrameArgs {
    #[command(flatten)]
    scene: SceneArgs,

    /// Frame index (0-based).
    #[arg(long)]
    frame: u64,

    /// Output PNG path for the topmost decoded video still.
    #[arg(long)]
    png: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Duration(args) => cmd_duration(args),
        Command::Assets(args) => cmd_assets(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

struct Prepared {
    factory: vnmark_render::CueSceneFactory,
    props: vnmark_render::RenderProps,
    services: vnmark_render::MediaServices,
}

fn prepare(args: &SceneArgs, decode: bool) -> anyhow::Result<Prepared> {
    let sheet = vnmark_render::CueSheet::from_json_file(&args.sheet)
        .with_context(|| format!("load cue sheet '{}'", args.sheet.display()))?;

    let mut props = match &args.props {
        Some(path) => vnmark_render::RenderProps::from_json_file(path)
            .with_context(|| format!("load props '{}'", path.display()))?,
        None => vnmark_render::RenderProps::default(),
    };
    if let Some(fps) = args.fps {
        props.fps = fps;
    }
    if let Some(file_name) = &args.file_name {
        props.file_name = file_name.clone();
    }
    if let Some(choices) = &args.choices {
        props.choices = choices.clone();
    }
    if let Some(root) = &args.assets_root {
        props.assets_root = Some(root.clone());
    }
    if props.assets_root.is_none() {
        props.assets_root = args.sheet.parent().map(Path::to_path_buf);
    }

    let probe = sheet
        .duration_probe()
        .with_fallback(Rc::new(vnmark_render::FfprobeDurationProbe));
    let decoder = decode.then(|| -> Rc<dyn vnmark_render::FrameDecoder> {
        Rc::new(vnmark_render::FfmpegFrameDecoder::new())
    });

    Ok(Prepared {
        factory: vnmark_render::CueSceneFactory::new(sheet),
        props,
        services: vnmark_render::MediaServices {
            probe: Rc::new(probe),
            decoder,
        },
    })
}

fn cmd_duration(args: SceneArgs) -> anyhow::Result<()> {
    let p = prepare(&args, false)?;
    let meta = futures::executor::block_on(vnmark_render::calculate_metadata(
        &p.factory,
        &p.props,
        &p.services,
    ))?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

fn cmd_assets(args: AssetsArgs) -> anyhow::Result<()> {
    let p = prepare(&args.scene, false)?;
    let log = futures::executor::block_on(async {
        let meta = vnmark_render::calculate_metadata(&p.factory, &p.props, &p.services).await?;
        let mut session =
            vnmark_render::RenderSession::open(&p.factory, &p.props, &p.services, false).await?;
        let log = session
            .render_range(
                vnmark_render::FrameIndex(0),
                vnmark_render::FrameIndex(meta.duration_in_frames),
            )
            .await?;
        session.close();
        Ok::<_, vnmark_render::VnmarkError>(log)
    })?;
    tracing::info!(frames = log.frames.len(), "asset log collected");

    let write = |w: &mut dyn std::io::Write| -> anyhow::Result<()> {
        if args.spans {
            serde_json::to_writer_pretty(&mut *w, &log.spans())?;
        } else {
            serde_json::to_writer_pretty(&mut *w, &log)?;
        }
        writeln!(w)?;
        Ok(())
    };
    match &args.out {
        Some(out) => {
            let f = File::create(out).with_context(|| format!("create '{}'", out.display()))?;
            write(&mut BufWriter::new(f))?;
            eprintln!("wrote {}", out.display());
        }
        None => write(&mut std::io::stdout().lock())?,
    }
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let p = prepare(&args.scene, args.png.is_some())?;
    let frame = vnmark_render::FrameIndex(args.frame);
    let (assets, still) = futures::executor::block_on(async {
        let mut session =
            vnmark_render::RenderSession::open(&p.factory, &p.props, &p.services, false).await?;
        let assets = session.render_frame(frame).await?;
        // Read the still before closing; closing detaches every element.
        let still = p
            .factory
            .last_player()
            .and_then(|player| player.top_video_image());
        session.close();
        Ok::<_, vnmark_render::VnmarkError>((assets, still))
    })?;
    if assets.frame != frame {
        eprintln!(
            "script finished at frame {}, before requested frame {}",
            assets.frame, frame
        );
    }
    println!("{}", serde_json::to_string_pretty(&assets)?);

    if let Some(png) = &args.png {
        let still = still.context("no video still at this frame")?;
        still
            .to_rgba_image()?
            .save(png)
            .with_context(|| format!("write png '{}'", png.display()))?;
        eprintln!("wrote {}", png.display());
    }
    Ok(())
}
