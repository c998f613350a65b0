mod config;
mod context;
mod core;
mod decode;
mod hardware;
mod ui;

use anyhow::{anyhow, Context as _};
use clap::Parser;
use config::{AppSettings, ScopeArgs};
use context::ScopeContext;
use hardware::{spawn_session, RusbHost};
use imgui::{Condition, Context, FontConfig, FontSource, WindowFlags};
use imgui_winit_support::{HiDpiMode, WinitPlatform};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use ui::{render_status, ScopeView};
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::window::WindowBuilder;

use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin_winit::{DisplayBuilder, GlWindow};
use glow::HasContext;
use raw_window_handle::HasRawWindowHandle;

use std::ffi::CString;
use std::time::Instant;

const WINDOW_TITLE: &str = "Mios USB Signal Scope";

/// Height reserved for the status line under the plots
const STATUS_HEIGHT: f32 = 24.0;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ScopeArgs::parse();
    let ctx = ScopeContext::new(args.filter(), args.backoff());
    ctrlc::set_handler(ctx.interrupt_handler()).context("Failed to install Ctrl-C handler")?;

    let host = RusbHost::new().context("Failed to initialise libusb")?;
    spawn_session(host, ctx.clone()).context("Failed to start USB session thread")?;

    let mut settings = AppSettings::load();
    let mut view = ScopeView::new();

    let event_loop = EventLoop::new().map_err(|e| anyhow!("Failed to create event loop: {e}"))?;

    let (window, gl_config) = DisplayBuilder::new()
        .with_window_builder(Some(
            WindowBuilder::new()
                .with_title(WINDOW_TITLE)
                .with_position(winit::dpi::LogicalPosition::new(50.0, 50.0))
                .with_inner_size(winit::dpi::LogicalSize::new(settings.window_width, settings.window_height)),
        ))
        .build(&event_loop, glutin::config::ConfigTemplateBuilder::new(), |mut configs| {
            configs.next().expect("display offers no GL configurations")
        })
        .map_err(|e| anyhow!("Failed to create window and display: {e}"))?;

    let window = window.ok_or_else(|| anyhow!("Failed to create window"))?;
    let gl_display = gl_config.display();

    let context = unsafe {
        gl_display.create_context(
            &gl_config,
            &glutin::context::ContextAttributesBuilder::new().build(Some(window.raw_window_handle())),
        )
    }
    .map_err(|e| anyhow!("Failed to create GL context: {e}"))?;

    let attrs = window.build_surface_attributes(
        glutin::surface::SurfaceAttributesBuilder::<glutin::surface::WindowSurface>::new(),
    );
    let surface = unsafe { gl_display.create_window_surface(&gl_config, &attrs) }
        .map_err(|e| anyhow!("Failed to create surface: {e}"))?;
    let context = context
        .make_current(&surface)
        .map_err(|e| anyhow!("Failed to make GL context current: {e}"))?;

    let load_gl = |symbol: &str| match CString::new(symbol) {
        Ok(name) => gl_display.get_proc_address(&name) as *const _,
        Err(_) => std::ptr::null(),
    };
    let gl = unsafe { glow::Context::from_loader_function(load_gl) };
    // second handle on the same GL context, used only to clear the frame
    let gl_clear = unsafe { glow::Context::from_loader_function(load_gl) };

    let mut imgui = Context::create();
    imgui.set_ini_filename(None::<std::path::PathBuf>);
    imgui.set_log_filename(None::<std::path::PathBuf>);

    let hidpi_factor = window.scale_factor();
    imgui.fonts().add_font(&[FontSource::DefaultFontData {
        config: Some(FontConfig {
            size_pixels: (14.0 * hidpi_factor) as f32,
            ..FontConfig::default()
        }),
    }]);
    imgui.io_mut().font_global_scale = (1.0 / hidpi_factor) as f32;

    let mut platform = WinitPlatform::init(&mut imgui);
    platform.attach_window(imgui.io_mut(), &window, HiDpiMode::Default);

    let mut renderer = imgui_glow_renderer::AutoRenderer::initialize(gl, &mut imgui)
        .map_err(|e| anyhow!("Failed to initialise renderer: {e}"))?;

    info!(
        "Plotting device {:04x}:{:04x} subclass 0x{:02x}",
        args.vendor_id, args.product_id, args.subclass
    );

    let mut last_frame_time = Instant::now();

    event_loop
        .run(move |event, window_target| {
            match event {
                Event::NewEvents(_) => {
                    let now = Instant::now();
                    imgui.io_mut().update_delta_time(now - last_frame_time);
                    last_frame_time = now;
                }
                Event::AboutToWait => {
                    // set by the close button and by Ctrl-C
                    if !ctx.is_running() {
                        if !window_target.exiting() {
                            info!("Shutting down");
                            settings.save();
                            window_target.exit();
                        }
                        return;
                    }
                    if let Err(e) = platform.prepare_frame(imgui.io_mut(), &window) {
                        error!("Failed to prepare frame: {}", e);
                    }
                    window.request_redraw();
                }
                Event::WindowEvent { event: WindowEvent::RedrawRequested, .. } => {
                    // Lock is held only while copying the capture
                    let snapshot = view.sync(&ctx.decoder, &settings);

                    let ui = imgui.new_frame();
                    let display_size = ui.io().display_size;
                    ui.window("main")
                        .position([0.0, 0.0], Condition::Always)
                        .size(display_size, Condition::Always)
                        .flags(
                            WindowFlags::NO_TITLE_BAR
                                | WindowFlags::NO_RESIZE
                                | WindowFlags::NO_MOVE
                                | WindowFlags::NO_COLLAPSE
                                | WindowFlags::NO_BACKGROUND,
                        )
                        .build(|| {
                            ui.child_window("plots")
                                .size([0.0, -STATUS_HEIGHT])
                                .build(|| view.render(ui, &snapshot, &mut settings));
                            ui.separator();
                            render_status(ui, &ctx.stats);
                        });

                    platform.prepare_render(ui, &window);
                    let draw_data = imgui.render();

                    unsafe {
                        gl_clear.clear_color(0.0, 0.0, 0.0, 1.0);
                        gl_clear.clear(glow::COLOR_BUFFER_BIT);
                    }
                    if let Err(e) = renderer.render(draw_data) {
                        error!("Rendering failed: {}", e);
                        ctx.shutdown();
                    }
                    if let Err(e) = surface.swap_buffers(&context) {
                        error!("Failed to swap buffers: {}", e);
                        ctx.shutdown();
                    }
                }
                Event::WindowEvent { event: WindowEvent::Resized(size), .. } => {
                    let logical = size.to_logical::<f64>(window.scale_factor());
                    settings.window_width = logical.width;
                    settings.window_height = logical.height;
                }
                Event::WindowEvent { event: WindowEvent::CloseRequested, .. } => {
                    ctx.shutdown();
                }
                _ => {}
            }
            platform.handle_event(imgui.io_mut(), &window, &event);
        })
        .map_err(|e| anyhow!("Event loop error: {e}"))?;

    Ok(())
}
