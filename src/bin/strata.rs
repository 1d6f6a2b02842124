use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use strata::{
    Affine, Drawing, DrawingOpts, IntRect, ItemDesc, LineStyle, Overflow, PaintDesc, PatternDesc,
    PatternUnits, RenderFlags, RenderMode, Rgba8, ShapeDesc, StateFlags, Surface, ViewKey,
};

#[derive(Parser, Debug)]
#[command(name = "strata", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a scene JSON file as a PNG.
    Render(RenderArgs),
    /// Render the built-in demo scene twice (before and after a pan) and report cache reuse.
    Demo(DemoArgs),
}

#[derive(Parser, Debug)]
struct ViewArgs {
    /// Uniform zoom applied to the whole drawing.
    #[arg(long, default_value_t = 1.0)]
    zoom: f64,

    /// Horizontal pan in device pixels.
    #[arg(long, default_value_t = 0.0)]
    pan_x: f64,

    /// Vertical pan in device pixels.
    #[arg(long, default_value_t = 0.0)]
    pan_y: f64,

    /// Draw hairline outlines instead of filled content.
    #[arg(long)]
    outline: bool,

    /// Tint the pixels each item cache could serve.
    #[arg(long)]
    show_caches: bool,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    view: ViewArgs,
}

#[derive(Parser, Debug)]
struct DemoArgs {
    /// Output PNG path (the second, panned frame).
    #[arg(long)]
    out: PathBuf,

    /// Output width in pixels.
    #[arg(long, default_value_t = 512)]
    width: u32,

    /// Output height in pixels.
    #[arg(long, default_value_t = 384)]
    height: u32,

    /// Write the scene JSON used by the demo here as well.
    #[arg(long)]
    dump_scene: Option<PathBuf>,

    #[command(flatten)]
    view: ViewArgs,
}

/// A scene file: canvas size, optional tunables and the item tree.
#[derive(Debug, Serialize, Deserialize)]
struct SceneFile {
    width: u32,
    height: u32,
    #[serde(default)]
    background: Option<Rgba8>,
    #[serde(default)]
    opts: Option<DrawingOpts>,
    root: ItemDesc,
}

const CACHE_TINT: Rgba8 = Rgba8::new(0, 160, 255, 60);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Demo(args) => cmd_demo(args),
    }
}

fn read_scene_json(path: &Path) -> anyhow::Result<SceneFile> {
    let f = File::open(path).with_context(|| format!("open scene '{}'", path.display()))?;
    let scene: SceneFile =
        serde_json::from_reader(BufReader::new(f)).with_context(|| "parse scene JSON")?;
    if scene.width == 0 || scene.height == 0 {
        anyhow::bail!("scene width/height must be > 0");
    }
    Ok(scene)
}

fn view_transform(view: &ViewArgs) -> Affine {
    Affine::translate((view.pan_x, view.pan_y)) * Affine::scale(view.zoom)
}

fn build_drawing(scene: &SceneFile, view: &ViewArgs) -> anyhow::Result<Drawing> {
    let mut drawing = Drawing::new(scene.opts.unwrap_or_default())?;
    let root = drawing.show(ViewKey(0), &scene.root, None)?;
    drawing.set_root(Some(root))?;
    if view.outline {
        drawing.set_render_mode(RenderMode::Outline);
    }
    Ok(drawing)
}

fn render_frame(
    drawing: &mut Drawing,
    scene: &SceneFile,
    view: &ViewArgs,
    pan: (f64, f64),
) -> anyhow::Result<Surface> {
    let area = IntRect::from_xywh(0, 0, scene.width, scene.height);
    drawing.set_cache_limit(Some(area));
    let ctm = Affine::translate(pan) * view_transform(view);
    drawing.update(IntRect::infinite(), ctm, StateFlags::ALL, StateFlags::empty());

    let mut surface = Surface::new(area)?;
    {
        let mut dc = surface.context();
        if let Some(bg) = scene.background {
            dc.set_source_rgba(bg);
            dc.paint(1.0);
        }
        drawing.render(&mut dc, area, RenderFlags::empty());
    }
    let damage = drawing.take_damage();
    tracing::debug!(damage = %strata::diag::describe_region(&damage), "frame rendered");
    Ok(surface)
}

fn tint_caches(drawing: &Drawing, surface: &mut Surface) {
    for id in drawing.cached_items() {
        if let Some(cache) = drawing.cache(id) {
            strata::diag::tint_region(surface, cache.clean_region(), CACHE_TINT);
        }
    }
}

fn write_output(surface: &Surface, out: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    strata::diag::write_png(surface, out)?;
    eprintln!("wrote {}", out.display());
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let scene = read_scene_json(&args.in_path)?;
    let mut drawing = build_drawing(&scene, &args.view)?;
    let mut surface = render_frame(&mut drawing, &scene, &args.view, (0.0, 0.0))?;
    if args.view.show_caches {
        tint_caches(&drawing, &mut surface);
    }
    write_output(&surface, &args.out)
}

fn cmd_demo(args: DemoArgs) -> anyhow::Result<()> {
    let scene = demo_scene(args.width, args.height);
    if let Some(path) = &args.dump_scene {
        let f = File::create(path).with_context(|| format!("create '{}'", path.display()))?;
        serde_json::to_writer_pretty(f, &scene).with_context(|| "write scene JSON")?;
    }
    let mut drawing = build_drawing(&scene, &args.view)?;

    render_frame(&mut drawing, &scene, &args.view, (0.0, 0.0))?;
    let first_bytes = drawing.cache_bytes();
    let mut surface = render_frame(&mut drawing, &scene, &args.view, (16.0, 8.0))?;
    if args.view.show_caches {
        tint_caches(&drawing, &mut surface);
    }

    let cached = drawing.cached_items();
    eprintln!("cached items: {}", cached.len());
    for id in &cached {
        if let Some(cache) = drawing.cache(*id) {
            eprintln!(
                "  {id:?}: area {:?}, clean {}",
                cache.pixel_area(),
                strata::diag::describe_region(cache.clean_region())
            );
        }
    }
    let pool = drawing.pool_stats();
    eprintln!(
        "cache bytes: {first_bytes} -> {}; pool: {} allocated, {} reused, {} retained",
        drawing.cache_bytes(),
        pool.alloc_surfaces,
        pool.reused_surfaces,
        pool.retained_surfaces
    );
    write_output(&surface, &args.out)
}

fn demo_scene(width: u32, height: u32) -> SceneFile {
    let (w, h) = (f64::from(width), f64::from(height));
    let swatch = |x: f64, y: f64, c: Rgba8| {
        ItemDesc::shape(
            ShapeDesc::rect(strata::Rect::new(x, y, x + 96.0, y + 96.0)).with_fill(PaintDesc::Color(c)),
        )
    };
    let row = ItemDesc::group(vec![
        swatch(24.0, 24.0, Rgba8::opaque(220, 60, 60)),
        swatch(72.0, 48.0, Rgba8::new(60, 180, 90, 200)),
        swatch(120.0, 72.0, Rgba8::new(60, 90, 220, 160)),
    ])
    .cached();

    let hatch = PaintDesc::Pattern {
        pattern: Box::new(PatternDesc {
            tile: strata::Rect::new(0.0, 0.0, 12.0, 12.0),
            units: PatternUnits::UserSpaceOnUse,
            pattern_to_user: Some(Affine::rotate(0.6)),
            child_transform: None,
            overflow: Some(Overflow::hatch(4.0, 3)),
            children: vec![ItemDesc::shape(
                ShapeDesc::rect(strata::Rect::new(0.0, 0.0, 1.5, 12.0))
                    .with_fill(PaintDesc::Color(Rgba8::opaque(40, 40, 40))),
            )],
            debug: false,
        }),
        opacity: 0.9,
    };
    let disc = ItemDesc::shape(
        ShapeDesc::from_path(&kurbo::Shape::to_path(
            &kurbo::Circle::new((w * 0.65, h * 0.5), h * 0.3),
            0.1,
        ))
        .with_fill(hatch)
        .with_stroke(
            PaintDesc::Color(Rgba8::opaque(30, 30, 30)),
            LineStyle::with_width(3.0),
        ),
    );
    let clip = ItemDesc::shape(ShapeDesc::rect(strata::Rect::new(
        w * 0.4,
        0.0,
        w,
        h * 0.7,
    )));
    let clipped = ItemDesc::group(vec![disc]).with_clip(clip).with_opacity(0.85);

    SceneFile {
        width,
        height,
        background: Some(Rgba8::opaque(245, 243, 238)),
        opts: None,
        root: ItemDesc::group(vec![row, clipped]),
    }
}
