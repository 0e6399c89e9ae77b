//! Integration tests for the application container and on-disk persistence.
//!
//! Agents are saved through the MessagePack repository into a temporary
//! state directory and restored the way the CLI restores them at startup.

use std::fs;

use scroller::{
    adapters::{InMemoryRepository, MsgPackRepository},
    app::{AgentConfig, App},
    dqn::NetworkAgent,
    game::{Action, Vec2},
    persistence::{AgentState, SavedAgent},
    ports::{AgentKind, AgentRepository, Learner},
    q_learning::TabularAgent,
};

fn disk_app() -> App {
    App::for_testing()
        .with_repository(MsgPackRepository::new())
        .with_default_seed(11)
        .build()
}

#[test]
fn test_tabular_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = AgentConfig::new(AgentKind::Tabular).with_state_dir(dir.path().join("state"));
    let app = disk_app();

    let mut agent = TabularAgent::new(
        config.run.tabular.clone(),
        config.run.memory.clone(),
        config.run.heuristic.clone(),
    )
    .unwrap();
    let mut state = agent.export_state();
    state.memory.record_death(Vec2::new(640.0, 400.0), Action::Right);
    state.memory.record_death(Vec2::new(1510.0, 400.0), Action::Jump);
    state.epsilon = 0.12;
    state.episodes = 40;
    agent.restore(state);
    app.save_agent(&agent, &config.state_path()).unwrap();
    assert!(config.state_path().exists());

    let restored = app.load_or_create(&config).unwrap();
    assert_eq!(restored.episodes(), 40);
    assert_eq!(restored.epsilon(), 0.12);
    let restored = restored.as_any().downcast_ref::<TabularAgent>().unwrap();
    assert_eq!(restored.memory(), agent.memory());
    assert_eq!(restored.table(), agent.table());
}

#[test]
fn test_network_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AgentConfig::new(AgentKind::Network).with_state_dir(dir.path());
    config.run.network.hidden_units = 8;
    let app = disk_app();

    let agent = app.create_agent(&config).unwrap();
    app.save_agent(agent.as_ref(), &config.state_path()).unwrap();

    let restored = app.load_or_create(&config).unwrap();
    let original = agent.as_any().downcast_ref::<NetworkAgent>().unwrap();
    let restored = restored.as_any().downcast_ref::<NetworkAgent>().unwrap();
    let weights = restored.online().weights().unwrap();
    assert_eq!(weights, original.online().weights().unwrap());
    assert_eq!(restored.target().weights().unwrap(), weights);
    assert!(restored.replay().is_empty());
}

#[test]
fn test_network_with_truncated_weights_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AgentConfig::new(AgentKind::Network).with_state_dir(dir.path());
    config.run.network.hidden_units = 8;
    let app = disk_app();

    let agent = app.create_agent(&config).unwrap();
    let mut saved = agent.snapshot().unwrap();
    let AgentState::Network(ref mut state) = saved.state else {
        panic!("network agent produced a tabular snapshot");
    };
    state.online.hidden_weight.truncate(3);
    state.episodes = 25;
    saved.metadata.episodes = 25;
    MsgPackRepository::new()
        .save(&saved, &config.state_path())
        .unwrap();

    // The file itself decodes fine; only the weights are unusable.
    assert!(app.load_snapshot(&config.state_path(), config.kind).is_ok());
    let restored = app.load_or_create(&config).unwrap();
    assert_eq!(restored.episodes(), 0);
    let restored = restored.as_any().downcast_ref::<NetworkAgent>().unwrap();
    let weights = restored.online().weights().unwrap();
    assert_eq!(weights.hidden_weight.len(), weights.input_dim * 8);
}

#[test]
fn test_corrupt_file_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let config = AgentConfig::new(AgentKind::Tabular).with_state_dir(dir.path());
    fs::write(config.state_path(), b"\xc1\xc1 not a snapshot").unwrap();

    let app = disk_app();
    assert!(app.load_snapshot(&config.state_path(), config.kind).is_err());
    let agent = app.load_or_create(&config).unwrap();
    assert_eq!(agent.episodes(), 0);
    let agent = agent.as_any().downcast_ref::<TabularAgent>().unwrap();
    assert!(agent.memory().is_empty());
    assert!(agent.table().is_empty());
}

#[test]
fn test_unsupported_version_starts_fresh() {
    let repository = InMemoryRepository::new();
    let app = App::for_testing()
        .with_repository(repository.clone())
        .build();
    let config = AgentConfig::new(AgentKind::Tabular);

    let fresh = app.create_agent(&config).unwrap();
    let mut saved = fresh.snapshot().unwrap();
    let AgentState::Tabular(ref mut state) = saved.state else {
        panic!("tabular agent produced a network snapshot");
    };
    state.episodes = 99;
    saved.metadata.episodes = 99;
    saved.version = SavedAgent::VERSION + 1;
    repository.save(&saved, &config.state_path()).unwrap();

    assert!(app.load_snapshot(&config.state_path(), config.kind).is_err());
    assert_eq!(app.load_or_create(&config).unwrap().episodes(), 0);
}

#[test]
fn test_each_kind_has_its_own_file() {
    let dir = tempfile::tempdir().unwrap();
    let app = disk_app();
    for kind in [AgentKind::Tabular, AgentKind::Network] {
        let config = AgentConfig::new(kind).with_state_dir(dir.path());
        let agent = app.create_agent(&config).unwrap();
        app.save_agent(agent.as_ref(), &config.state_path()).unwrap();
    }

    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["network.msgpack", "tabular.msgpack"]);
}
