use crate::session::Session;
use anyhow::{Context, Result, anyhow};
use pixels::{Pixels, SurfaceTexture};
use presac_experiment::stimuli::stimulus_path;
use presac_experiment::{
    DummyEyeTracker, ExperimentEvent, ExperimentStateMachine, Key, NullPort,
};
use presac_render::{FrameStats, SkiaRenderer, load_font};
use presac_timing::{HighPrecisionTimer, Timer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

type Experiment = ExperimentStateMachine<HighPrecisionTimer, DummyEyeTracker, NullPort>;

pub struct App {
    session: Option<Session>,
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    experiment: Option<Experiment>,
    renderer: Option<SkiaRenderer>,
    fullscreen: bool,
    refresh_rate: Option<f64>,
    last_present: Option<u64>,

    failure: Option<anyhow::Error>,
}

fn map_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::Space => Some(Key::Accept),
        KeyCode::Enter | KeyCode::NumpadEnter => Some(Key::Drift),
        KeyCode::Escape => Some(Key::Break),
        KeyCode::Digit7 | KeyCode::Numpad7 => Some(Key::Yes),
        KeyCode::Digit8 | KeyCode::Numpad8 => Some(Key::No),
        KeyCode::KeyY => Some(Key::ConfirmYes),
        KeyCode::KeyN => Some(Key::ConfirmNo),
        _ => None,
    }
}

impl App {
    pub fn new(session: Session, fullscreen: bool) -> Self {
        Self {
            session: Some(session),
            window: None,
            pixels: None,
            experiment: None,
            renderer: None,
            fullscreen,
            refresh_rate: None,
            last_present: None,
            failure: None,
        }
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!(
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "starting presentation"
        );

        event_loop.run_app(&mut self)?;

        if let Some(renderer) = &self.renderer {
            for component in ["clear", "draw", "copy", "total"] {
                if let Some(stats) = renderer.component_stats(component) {
                    info!(
                        component,
                        mean_ms = stats.average_frame_time_ns / 1e6,
                        max_ms = stats.max_frame_time_ns / 1e6,
                        "render timing"
                    );
                }
            }
        }

        if let Some(e) = self.failure.take() {
            return Err(e);
        }
        if let Some(e) = self.experiment.as_mut().and_then(|x| x.take_failure()) {
            return Err(anyhow!(e).context("session aborted"));
        }
        if let Some(path) = self.experiment.as_ref().and_then(|x| x.saved_path()) {
            info!(path = %path.display(), "session complete");
        }
        Ok(())
    }

    fn create_window_and_session(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let session = self
            .session
            .take()
            .ok_or_else(|| anyhow!("session already started"))?;

        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;
        self.refresh_rate = monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let mut attributes = Window::default_attributes()
            .with_title("presac")
            .with_resizable(false);
        if self.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))));
        } else {
            let (w, h) = session.info.screen.resolution;
            attributes = attributes.with_inner_size(PhysicalSize::new(w, h));
        }

        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        info!(
            width = size.width,
            height = size.height,
            scale_factor = window.scale_factor(),
            refresh_hz = ?self.refresh_rate,
            "display configured"
        );
        if (size.width, size.height) != session.info.screen.resolution {
            warn!(
                configured = ?session.info.screen.resolution,
                actual = ?(size.width, size.height),
                "window size differs from the configured resolution; visual angles will be off"
            );
        }

        let surface = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface)?);
        self.renderer = Some(Self::prepare_renderer(&session, size)?);

        let Session { info, config, plan } = session;
        let center = info.screen.origin_centered_to_eyelink((0.0, 0.0));
        self.experiment = Some(ExperimentStateMachine::new(
            config,
            &info,
            plan,
            HighPrecisionTimer::new(),
            DummyEyeTracker::new(center),
            NullPort::default(),
        )?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn prepare_renderer(session: &Session, size: PhysicalSize<u32>) -> Result<SkiaRenderer> {
        let config = &session.config;
        let mut renderer = SkiaRenderer::new(size.width, size.height)?;
        renderer.set_dot_radii(config.fixation_radius_px, config.drift_fixation_radius_px)?;
        renderer.set_font(load_font(&config.font_path)?, config.text_height_px);

        let size_px = session.info.screen.deg2pix(config.stim_size_deg).round() as u32;
        for trial in &session.plan.trials {
            for id in &trial.stimuli() {
                if renderer.has_stimulus(id) {
                    continue;
                }
                let path = stimulus_path(&config.stim_dir, id);
                renderer
                    .load_stimulus(id, &path, size_px)
                    .with_context(|| format!("loading stimulus {}", path.display()))?;
            }
        }
        info!(images = renderer.stimulus_count(), size_px, "stimuli loaded");
        Ok(renderer)
    }

    fn frame(&mut self) -> Result<()> {
        let (Some(experiment), Some(renderer), Some(pixels)) = (
            self.experiment.as_mut(),
            self.renderer.as_mut(),
            self.pixels.as_mut(),
        ) else {
            return Ok(());
        };

        for event in experiment.update() {
            experiment.handle_event(event);
        }

        let screen = experiment.current_screen();
        let stats: FrameStats = renderer.render_frame(&screen, pixels.frame_mut())?;
        pixels.render()?;

        let now = experiment.timer.now();
        if let Some(last) = self.last_present {
            experiment.frame_presented(Duration::from_nanos(now.saturating_sub(last)));
        }
        self.last_present = Some(now);

        debug!(
            clear_ms = stats.clear.as_secs_f64() * 1e3,
            draw_ms = stats.draw.as_secs_f64() * 1e3,
            copy_ms = stats.copy.as_secs_f64() * 1e3,
            total_ms = stats.total.as_secs_f64() * 1e3,
            dirty = stats.dirty_count,
            "frame"
        );
        Ok(())
    }

    fn handle_input(&mut self, key: PhysicalKey) {
        let PhysicalKey::Code(code) = key else {
            return;
        };
        let (Some(key), Some(experiment)) = (map_key(code), self.experiment.as_mut()) else {
            return;
        };
        if !experiment.handle_event(ExperimentEvent::KeyPressed(key)) {
            debug!(key = key.name(), phase = ?experiment.phase, "key ignored");
        }
    }

    fn exit_with(&mut self, event_loop: &ActiveEventLoop, failure: Option<anyhow::Error>) {
        if let Some(e) = failure {
            error!("{e:#}");
            self.failure = Some(e);
        }
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_session(event_loop) {
                self.exit_with(event_loop, Some(e));
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                warn!("window closed before the session finished");
                self.exit_with(event_loop, None);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.frame() {
                    self.exit_with(event_loop, Some(e));
                    return;
                }
                if self.experiment.as_ref().is_some_and(|x| x.is_finished()) {
                    self.exit_with(event_loop, None);
                } else if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed() && !event.repeat =>
            {
                self.handle_input(event.physical_key);
            }
            _ => {}
        }
    }
}
