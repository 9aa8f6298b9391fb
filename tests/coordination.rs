use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;

use vision_pilot::action::{ActionCommand, ActionKind, MouseButton, RecordingSink};
use vision_pilot::{
    spawn_controller, AdvanceController, AdvancePolicy, AimController, AimPolicy, BoundingBox,
    CaptureBackend, ControllerHandle, DetectionLoop, LoopSettings, ScreenConfig, ScreenSource,
    ScriptedBackend, SharedDetection, StopReason,
};

const PERSON: vision_pilot::ClassId = vision_pilot::ClassId(0);

struct Rig {
    state: Arc<SharedDetection>,
    pointer: RecordingSink,
    keyboard: RecordingSink,
    controllers: Vec<ControllerHandle>,
    pilot: DetectionLoop<ScreenSource>,
}

fn rig(backend: ScriptedBackend, keyboard: RecordingSink) -> Result<Rig> {
    let state = Arc::new(SharedDetection::new());
    let pointer = RecordingSink::new();
    let advance_policy = AdvancePolicy {
        pulse: Duration::from_millis(5),
        ..AdvancePolicy::default()
    };
    let controllers = vec![
        spawn_controller(
            AimController::new(AimPolicy::default()),
            state.clone(),
            {
                let sink = pointer.clone();
                move || Ok(sink)
            },
            Duration::ZERO,
        )?,
        spawn_controller(
            AdvanceController::new(advance_policy),
            state.clone(),
            {
                let sink = keyboard.clone();
                move || Ok(sink)
            },
            Duration::ZERO,
        )?,
    ];
    let source = ScreenSource::new(ScreenConfig {
        backend: CaptureBackend::Stub,
        ..ScreenConfig::default()
    })?;
    let settings = LoopSettings {
        max_fps: 200,
        ..LoopSettings::new(PERSON)
    };
    let pilot = DetectionLoop::new(source, Box::new(backend), state.clone(), settings);
    Ok(Rig {
        state,
        pointer,
        keyboard,
        controllers,
        pilot,
    })
}

impl Rig {
    /// Shut down and join; returns the per-controller join results.
    fn stop(self) -> Vec<Result<u64>> {
        self.state.shutdown();
        self.controllers
            .into_iter()
            .map(|h| h.join().map(|stats| stats.snapshots))
            .collect()
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("condition not reached");
}

fn settle() {
    thread::sleep(Duration::from_millis(40));
}

#[test]
fn centered_target_clicks_once_and_pulses_once() -> Result<()> {
    let backend = ScriptedBackend::coco()
        .then_box("person", BoundingBox::new(300, 200, 340, 240), 0.85)
        .then_nothing()
        .then_nothing();
    let mut rig = rig(backend, RecordingSink::new())?;

    rig.pilot.run_cycle()?;
    let (pointer, keyboard) = (rig.pointer.clone(), rig.keyboard.clone());
    wait_until(|| pointer.commands().len() == 1 && keyboard.commands().len() == 2);
    rig.pilot.run_cycle()?;
    rig.pilot.run_cycle()?;
    settle();

    assert_eq!(rig.state.confidence(), 0.0);
    assert_eq!(
        pointer.commands(),
        vec![ActionCommand::Click {
            button: MouseButton::Left
        }]
    );
    assert_eq!(
        keyboard.commands(),
        vec![
            ActionCommand::KeyDown { key: 'w' },
            ActionCommand::KeyUp { key: 'w' }
        ]
    );
    for result in rig.stop() {
        assert_eq!(result?, 1);
    }
    Ok(())
}

#[test]
fn mid_confidence_advances_while_aim_idles() -> Result<()> {
    let backend = ScriptedBackend::coco().then_box("person", BoundingBox::new(0, 0, 40, 40), 0.75);
    let mut rig = rig(backend, RecordingSink::new())?;

    rig.pilot.run_cycle()?;
    let (pointer, keyboard) = (rig.pointer.clone(), rig.keyboard.clone());
    wait_until(|| pointer.commands().len() == 1 && keyboard.commands().len() == 2);

    let pointer_commands = pointer.commands();
    assert!(pointer_commands[0].is_idle_move());
    assert_eq!(keyboard.commands()[0], ActionCommand::KeyDown { key: 'w' });
    for result in rig.stop() {
        result?;
    }
    Ok(())
}

#[test]
fn off_center_target_steers_without_clicking() -> Result<()> {
    let backend =
        ScriptedBackend::coco().then_box("person", BoundingBox::new(500, 235, 540, 275), 0.9);
    let mut rig = rig(backend, RecordingSink::new())?;

    rig.pilot.run_cycle()?;
    let pointer = rig.pointer.clone();
    wait_until(|| pointer.commands().len() == 1);

    assert_eq!(
        pointer.commands(),
        vec![ActionCommand::Move {
            dx: 200,
            dy: 0,
            duration: Duration::from_millis(150)
        }]
    );
    for result in rig.stop() {
        result?;
    }
    Ok(())
}

#[test]
fn sub_threshold_and_other_classes_are_never_published() -> Result<()> {
    let backend = ScriptedBackend::coco()
        .then_box("person", BoundingBox::new(300, 200, 340, 240), 0.65)
        .then_box("car", BoundingBox::new(300, 200, 340, 240), 0.99);
    let mut rig = rig(backend, RecordingSink::new())?;

    let first = rig.pilot.run_cycle()?;
    let second = rig.pilot.run_cycle()?;
    settle();

    assert!(first.target.is_none() && second.target.is_none());
    assert!(!rig.state.is_present());
    assert!(rig.pointer.commands().is_empty());
    assert!(rig.keyboard.commands().is_empty());
    for result in rig.stop() {
        assert_eq!(result?, 0);
    }
    Ok(())
}

#[test]
fn inference_failure_ends_the_loop() -> Result<()> {
    let backend = ScriptedBackend::coco()
        .then_nothing()
        .then_fail("session crashed");
    let mut rig = rig(backend, RecordingSink::new())?;

    let running = AtomicBool::new(true);
    let err = rig.pilot.run(&running).unwrap_err();
    assert!(format!("{:#}", err).contains("session crashed"));
    assert_eq!(rig.pilot.stats().cycles, 1);

    for result in rig.stop() {
        result?;
    }
    Ok(())
}

#[test]
fn controller_failure_stops_the_detection_loop() -> Result<()> {
    let backend = ScriptedBackend::coco()
        .then_box("person", BoundingBox::new(300, 200, 340, 240), 0.85)
        .cycling();
    let mut rig = rig(backend, RecordingSink::new().failing_on(ActionKind::KeyDown))?;

    let running = AtomicBool::new(true);
    assert_eq!(rig.pilot.run(&running)?, StopReason::Shutdown);

    let results = rig.stop();
    assert!(results[0].is_ok());
    let err = results[1].as_ref().unwrap_err();
    assert!(format!("{:#}", err).contains("advance controller failed"));
    Ok(())
}
