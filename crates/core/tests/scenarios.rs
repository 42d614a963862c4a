use std::{cell::RefCell, rc::Rc, time::Duration};

use avgplayer_core::{
    animate_attr, fade_in, fade_out, AttrKey, Player, PlayerConfig, PlayerError, SceneDescriptor,
};

const SCENE: &str = r#"{
    "width": 320,
    "height": 240,
    "root": { "type": "div", "id": "main", "children": [
        { "type": "image", "id": "mainimg", "x": 10, "y": 10, "width": 100, "height": 80, "opacity": 0.0 },
        { "type": "excl", "id": "switch", "children": [
            { "type": "words", "id": "first", "text": "one" },
            { "type": "words", "id": "second", "text": "two" }
        ]}
    ]}
}"#;

fn player() -> Player {
    player_at(PlayerConfig::default().frame_rate)
}

fn player_at(frame_rate: f64) -> Player {
    let config = PlayerConfig {
        frame_rate,
        ..PlayerConfig::default()
    };
    let mut player = Player::new(config).unwrap();
    player
        .load_scene(&SceneDescriptor::from_json(SCENE).unwrap())
        .unwrap();
    player
}

#[test]
fn interval_cleared_by_timeout_while_playing() {
    let mut player = player();
    let fired = Rc::new(RefCell::new(Vec::new()));
    let log = fired.clone();
    let interval = player.set_interval(40, move |player| {
        log.borrow_mut().push(player.frame_time());
        Ok(())
    });
    player.set_timeout(5000, |player| {
        player.stop();
        Ok(())
    });
    player.set_timeout(500, move |player| {
        assert!(player.clear_interval(interval));
        Ok(())
    });

    player.play(None).unwrap();

    let fired = fired.borrow();
    assert_eq!(fired.len(), 12);
    assert_eq!(fired.first(), Some(&Duration::from_millis(40)));
    assert_eq!(fired.last(), Some(&Duration::from_millis(480)));
    assert_eq!(player.frame_time(), Duration::from_millis(5000));
    assert_eq!(player.frames_rendered(), 125);
    assert_eq!(player.callback_errors(), 0);
}

#[test]
fn one_shot_fires_once_after_many_interval_ticks() {
    for rate in [25.0, 30.0, 50.0, 60.0] {
        one_shot_and_interval_at(rate);
    }
}

fn one_shot_and_interval_at(rate: f64) {
    let mut player = player_at(rate);
    let ticks = Rc::new(RefCell::new(0));
    let timeouts = Rc::new(RefCell::new(0));
    let tick_counter = ticks.clone();
    let timeout_counter = timeouts.clone();
    player.set_timeout(5000, move |_| {
        *timeout_counter.borrow_mut() += 1;
        Ok(())
    });
    player.set_interval(40, move |_| {
        *tick_counter.borrow_mut() += 1;
        Ok(())
    });

    player.advance_to(Duration::from_millis(500));
    assert_eq!(*ticks.borrow(), 12, "{rate} fps");
    assert_eq!(*timeouts.borrow(), 0, "{rate} fps");

    player.advance_to(Duration::from_millis(6000));
    assert_eq!(*timeouts.borrow(), 1, "{rate} fps");
    assert_eq!(*ticks.borrow(), 150, "{rate} fps");
}

#[test]
fn timeout_fires_on_the_frame_that_reaches_it_at_30_fps() {
    let mut player = player_at(30.0);
    let image = player.get_element_by_id("mainimg").unwrap();
    player.set_attr(image, AttrKey::Opacity, 1.0).unwrap();
    let fired_at = Rc::new(RefCell::new(None));
    let slot = fired_at.clone();
    player.set_timeout(1000, move |player| {
        *slot.borrow_mut() = Some(player.frame_time());
        Ok(())
    });
    let fade = fade_out(&mut player, image, 1000).unwrap();

    for _ in 0..30 {
        player.step();
    }
    assert_eq!(player.frame_time(), Duration::from_millis(1000));
    assert_eq!(*fired_at.borrow(), Some(Duration::from_millis(1000)));
    assert!(fade.is_done());
    assert_eq!(
        player.scene().unwrap().get_float(image, AttrKey::Opacity).unwrap(),
        0.0
    );
}

#[test]
fn unknown_ids_are_lookup_errors() {
    let player = player();
    let err = player.get_element_by_id("nonexistent").unwrap_err();
    assert!(err.is_lookup());
    assert!(matches!(err, PlayerError::NodeNotFound(id) if id == "nonexistent"));
}

#[test]
fn out_of_range_active_child_leaves_excl_unchanged() {
    let mut player = player();
    let switch = player.get_element_by_id("switch").unwrap();
    let err = player.set_attr(switch, AttrKey::ActiveChild, 5).unwrap_err();
    assert!(err.is_range());
    assert_eq!(
        player.scene().unwrap().get_int(switch, AttrKey::ActiveChild).unwrap(),
        0
    );
}

#[test]
fn cancelling_twice_is_harmless() {
    let mut player = player();
    let handle = player.set_interval(40, |_| Ok(()));
    assert!(player.clear_interval(handle));
    assert!(!player.clear_interval(handle));
    player.advance_to(Duration::from_millis(200));
    assert_eq!(player.pending_timers(), 0);
}

#[test]
fn fade_in_rises_monotonically_to_its_target() {
    let mut player = player();
    let image = player.get_element_by_id("mainimg").unwrap();
    let samples = Rc::new(RefCell::new(Vec::new()));
    let log = samples.clone();
    player.set_interval(40, move |player| {
        let opacity = player.scene()?.get_float(image, AttrKey::Opacity)?;
        log.borrow_mut().push(opacity);
        Ok(())
    });

    let anim = fade_in(&mut player, image, 2000, 0.8).unwrap();
    player.advance_to(Duration::from_millis(2400));

    assert!(anim.is_done());
    let samples = samples.borrow();
    assert!(samples.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(samples.iter().all(|opacity| *opacity <= 0.8));
    assert_eq!(
        player.scene().unwrap().get_float(image, AttrKey::Opacity).unwrap(),
        0.8
    );
}

#[test]
fn animation_lands_exactly_on_its_end_value() {
    let mut player = player();
    let image = player.get_element_by_id("mainimg").unwrap();
    let anim = animate_attr(&mut player, image, AttrKey::X, 10.0, 250.0, 1010).unwrap();

    player.advance_to(Duration::from_millis(1000));
    assert!(!anim.is_done());
    player.advance_to(Duration::from_millis(1040));
    assert!(anim.is_done());
    assert_eq!(
        player.scene().unwrap().get_float(image, AttrKey::X).unwrap(),
        250.0
    );
    assert_eq!(player.pending_timers(), 0);
}

#[test]
fn timers_registered_in_a_callback_wait_for_the_next_tick() {
    let mut player = player();
    let fired_at = Rc::new(RefCell::new(None));
    let slot = fired_at.clone();
    player.set_timeout(40, move |player| {
        let slot = slot.clone();
        player.set_timeout(0, move |player| {
            *slot.borrow_mut() = Some(player.frame_time());
            Ok(())
        });
        Ok(())
    });

    player.advance_to(Duration::from_millis(40));
    assert_eq!(*fired_at.borrow(), None);
    player.advance_to(Duration::from_millis(80));
    assert_eq!(*fired_at.borrow(), Some(Duration::from_millis(80)));
}

#[test]
fn reloading_invalidates_old_handles_but_keeps_timers() {
    let path = std::env::temp_dir().join(format!("avgplayer-scenario-{}.json", std::process::id()));
    std::fs::write(&path, SCENE).unwrap();

    let mut player = player();
    let old = player.get_element_by_id("mainimg").unwrap();
    player.set_interval(40, |_| Ok(()));

    assert!(player.load_file(&path));
    let err = player.get_attr(old, AttrKey::Opacity).unwrap_err();
    assert!(err.is_lookup());
    assert!(player.get_element_by_id("mainimg").is_ok());
    assert_eq!(player.pending_timers(), 1);

    std::fs::remove_file(&path).unwrap();
    assert!(!player.load_file(&path));
    assert!(player.get_element_by_id("mainimg").is_ok());
}
