//! # Aerolink Simulator
//!
//! Runs the whole core against a simulated device: publishes a GPS, a
//! geofence and a 3-step magnetometer, watches them through component
//! references, and changes geofence settings. The simulated link echoes
//! commands from background jobs, and drops every third one so the
//! rollback path shows up in the logs.
//!
//! ## Timeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  t = 0        publish components, open references                       │
//! │  t = 300ms    max_altitude 100 ─► 120   (echoed, confirmed)             │
//! │  t = 600ms    max_distance 500 ─► 800   (echoed, confirmed)             │
//! │               mode altitude ─► cylinder (dropped, rolled back later)    │
//! │  t = 900ms    session suspended, GPS burst, session resumed             │
//! │  t = 1200ms   magnetometer calibration, one axis every 200ms            │
//! │  t = rollback timeout + 1.5s   final snapshots, teardown                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```text
//! RUST_LOG=debug AEROLINK_ROLLBACK_TIMEOUT_MS=1500 cargo run --bin simulate
//! ```

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::sync::mpsc;
use std::time::Duration;

use aerolink_core::component::{
    Axis, CalibrationState, Component, ComponentKind, GeofenceBackend, GeofenceCore, GeofenceMode,
    GpsCore, Magnetometer3StepBackend, Magnetometer3StepCore,
};
use aerolink_core::setting::{DoubleRange, RollbackPolicy};
use aerolink_core::{ComponentRef, ComponentStore, CoreConfig, CoreResult, Session};
use aerolink_tasks::{Executor, MainContext, TimerHandle};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Simulated round trip of one command over the device link.
const LINK_LATENCY: Duration = Duration::from_millis(80);

/// Every n-th geofence command is lost.
const DROP_EVERY: u32 = 3;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = CoreConfig::load_or_default(config_path);
    info!(
        main_thread = %config.executor.main_thread_name,
        background_threads = config.executor.background_threads,
        rollback_timeout_ms = config.settings.rollback_timeout_ms,
        "Configuration loaded"
    );

    let executor = Executor::start(config.executor_config())?;
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let scenario_executor = executor.clone();
    let rollback_timeout = config.rollback_timeout();
    executor.post_on_main(move || {
        if let Err(e) = run_scenario(&scenario_executor, rollback_timeout, done_tx.clone()) {
            error!(error = %e, "Scenario failed");
            let _ = done_tx.send(());
        }
    })?;

    let deadline = rollback_timeout + Duration::from_secs(10);
    if done_rx.recv_timeout(deadline).is_err() {
        warn!("Scenario did not finish in time");
    }

    executor.dispose();
    info!("Simulation complete");
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=aerolink=trace` - Show store and executor internals
/// - Default: INFO, DEBUG for aerolink crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,aerolink=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
}

// =============================================================================
// Scenario
// =============================================================================

/// Objects kept alive until teardown.
struct World {
    store: ComponentStore,
    session: Session,
    references: Vec<ComponentRef>,
    gps: Rc<GpsCore>,
    geofence: Rc<GeofenceCore>,
    magnetometer: Rc<Magnetometer3StepCore>,
}

fn run_scenario(executor: &Executor, rollback_timeout: Duration, done: mpsc::Sender<()>) -> CoreResult<()> {
    let main = executor.main_context()?;
    let store = ComponentStore::new();
    let session = Session::new();
    let policy = RollbackPolicy::new(Rc::new(main.clone()), rollback_timeout);

    // components, filled by their backends before publication
    let geofence_link = Rc::new(SimulatedGeofenceLink::new(main.clone()));
    let geofence = GeofenceCore::new(&store, geofence_link.clone(), policy);
    geofence_link.attach(&geofence);
    geofence
        .max_altitude()
        .update_bounds(DoubleRange::new(10.0, 150.0))
        .update_value(100.0);
    geofence
        .max_distance()
        .update_bounds(DoubleRange::new(10.0, 4000.0))
        .update_value(500.0);
    geofence.update_center(48.8790, 2.3677);

    let gps = GpsCore::new(&store);
    gps.update_fixed(true)
        .update_satellite_count(8)
        .update_location(48.8790, 2.3677, Some(35.0));

    let calibration_link = Rc::new(SimulatedCalibrationLink::new(main.clone()));
    let magnetometer = Magnetometer3StepCore::new(&store, calibration_link.clone());
    calibration_link.attach(&magnetometer);

    let references = vec![
        session.component_ref(&store, ComponentKind::Gps, log_change(ComponentKind::Gps))?,
        session.component_ref(&store, ComponentKind::Geofence, log_change(ComponentKind::Geofence))?,
        // a super-kind reference sees the 3-step refinement
        session.component_ref(&store, ComponentKind::Magnetometer, log_change(ComponentKind::Magnetometer))?,
    ];

    gps.publish();
    geofence.publish();
    magnetometer.publish();

    let world = Rc::new(World {
        store,
        session,
        references,
        gps,
        geofence,
        magnetometer,
    });

    let w = Rc::clone(&world);
    main.schedule(Duration::from_millis(300), move || {
        info!("User sets max altitude to 120");
        w.geofence.max_altitude().set_value(120.0);
    })?;

    let w = Rc::clone(&world);
    main.schedule(Duration::from_millis(600), move || {
        info!("User sets max distance to 800 and mode to cylinder");
        w.geofence.max_distance().set_value(800.0);
        w.geofence.mode().set_value(GeofenceMode::Cylinder);
    })?;

    let w = Rc::clone(&world);
    main.schedule(Duration::from_millis(900), move || {
        info!("Session suspended during a GPS burst");
        w.session.suspend();
        for count in 9..=12 {
            w.gps.update_satellite_count(count).notify_updated();
        }
        w.session.resume();
    })?;

    let w = Rc::clone(&world);
    main.schedule(Duration::from_millis(1200), move || {
        info!("User starts magnetometer calibration");
        w.magnetometer.start_calibration_process();
    })?;

    let w = Rc::clone(&world);
    let stats_main = main.clone();
    main.schedule(rollback_timeout + Duration::from_millis(1500), move || {
        for reference in &w.references {
            if let Some(component) = reference.get() {
                info!(kind = %component.kind(), snapshot = %snapshot_json(&component), "Final state");
            }
        }
        info!(stats = ?stats_main.stats(), "Executor stats");

        w.session.close();
        w.geofence.unpublish();
        w.store.destroy();
        let _ = done.send(());
    })?;

    Ok(())
}

fn log_change(kind: ComponentKind) -> impl Fn(Option<&Component>) + 'static {
    move |component| match component {
        Some(component) => info!(kind = %kind, snapshot = %snapshot_json(component), "Component changed"),
        None => info!(kind = %kind, "Component absent"),
    }
}

fn snapshot_json(component: &Component) -> String {
    serde_json::to_string(&component.snapshot()).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

// =============================================================================
// Simulated Device Links
// =============================================================================

/// Geofence backend that echoes accepted commands after [`LINK_LATENCY`].
struct SimulatedGeofenceLink {
    main: MainContext,
    core: RefCell<Weak<GeofenceCore>>,
    sent: Cell<u32>,
}

impl SimulatedGeofenceLink {
    fn new(main: MainContext) -> Self {
        SimulatedGeofenceLink {
            main,
            core: RefCell::new(Weak::new()),
            sent: Cell::new(0),
        }
    }

    fn attach(&self, core: &Rc<GeofenceCore>) {
        *self.core.borrow_mut() = Rc::downgrade(core);
    }

    fn send<T>(&self, command: &'static str, value: T, echo: fn(&GeofenceCore, T)) -> bool
    where
        T: Copy + Send + std::fmt::Debug + 'static,
    {
        let sent = self.sent.get() + 1;
        self.sent.set(sent);
        if sent % DROP_EVERY == 0 {
            warn!(command, ?value, "Link dropped command, expecting rollback");
            return true;
        }

        let task = match self.main.run_in_background(command, move || {
            std::thread::sleep(LINK_LATENCY);
            Ok(value)
        }) {
            Ok(task) => task,
            Err(e) => {
                warn!(command, error = %e, "Link unavailable");
                return false;
            }
        };

        let core = self.core.borrow().clone();
        task.when_complete(move |outcome| {
            if let (Some(core), Some(value)) = (core.upgrade(), outcome.value()) {
                info!(command, value = ?value, "Device confirmed");
                echo(&core, *value);
                core.notify_updated();
            }
        });
        true
    }
}

impl GeofenceBackend for SimulatedGeofenceLink {
    fn set_max_altitude(&self, altitude: f64) -> bool {
        self.send("geofence.max_altitude", altitude, |core, value| {
            core.max_altitude().update_value(value);
        })
    }

    fn set_max_distance(&self, distance: f64) -> bool {
        self.send("geofence.max_distance", distance, |core, value| {
            core.max_distance().update_value(value);
        })
    }

    fn set_mode(&self, mode: GeofenceMode) -> bool {
        self.send("geofence.mode", mode, |core, value| {
            core.mode().update_value(value);
        })
    }
}

/// Magnetometer backend that walks the three axes on a timer.
struct SimulatedCalibrationLink {
    main: MainContext,
    core: RefCell<Weak<Magnetometer3StepCore>>,
    steps: RefCell<Vec<TimerHandle>>,
}

const AXIS_STEP: Duration = Duration::from_millis(200);

impl SimulatedCalibrationLink {
    fn new(main: MainContext) -> Self {
        SimulatedCalibrationLink {
            main,
            core: RefCell::new(Weak::new()),
            steps: RefCell::new(Vec::new()),
        }
    }

    fn attach(&self, core: &Rc<Magnetometer3StepCore>) {
        *self.core.borrow_mut() = Rc::downgrade(core);
    }

    fn step(&self, after: Duration, apply: impl FnOnce(&Magnetometer3StepCore) + 'static) {
        let core = self.core.borrow().clone();
        let armed = self.main.schedule(after, move || {
            if let Some(core) = core.upgrade() {
                apply(&core);
                core.notify_updated();
            }
        });
        match armed {
            Ok(timer) => self.steps.borrow_mut().push(timer),
            Err(e) => warn!(error = %e, "Could not schedule calibration step"),
        }
    }
}

impl Magnetometer3StepBackend for SimulatedCalibrationLink {
    fn start_calibration_process(&self) {
        let axes = [Axis::Roll, Axis::Pitch, Axis::Yaw];
        for (index, axis) in axes.into_iter().enumerate() {
            let done: Vec<Axis> = axes[..index].to_vec();
            self.step(AXIS_STEP * (index as u32 + 1), move |core| {
                core.update_current_axis(Some(axis)).update_calibrated_axes(done);
            });
        }
        self.step(AXIS_STEP * 4, move |core| {
            core.update_calibrated_axes(axes)
                .update_calibration_state(CalibrationState::Calibrated)
                .calibration_process_stopped();
        });
    }

    fn cancel_calibration_process(&self) {
        for timer in self.steps.borrow_mut().drain(..) {
            timer.cancel();
        }
    }
}
