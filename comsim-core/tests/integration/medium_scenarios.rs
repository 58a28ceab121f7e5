//! Medium timing and arbitration observed through complete runs.

use comsim_core::{
    BlockingAgent, BlockingAgentConfig, FlightStructure, MediumConfig, MemoryLogSink,
    ProtocolAgent, ProtocolMessage, RetransmissionPolicy, Simulation, SimulationConfig,
    SimulationError, SimTime,
};

fn config(medium: MediumConfig) -> SimulationConfig {
    SimulationConfig { seed: 11, medium }
}

fn rate(data_rate: f64) -> MediumConfig {
    MediumConfig {
        data_rate: Some(data_rate),
        ..Default::default()
    }
}

fn one_flight(messages: &[(&str, usize)]) -> FlightStructure {
    FlightStructure::new(vec![
        messages
            .iter()
            .map(|(name, length)| ProtocolMessage::new(*name, *length))
            .collect(),
    ])
    .unwrap()
}

#[test]
fn test_inter_message_time_spaces_transmissions() {
    let medium = MediumConfig {
        inter_msg_time: 0.5,
        ..rate(300.0)
    };
    let mut sim = Simulation::new(&config(medium)).unwrap();
    let id = sim.primary_medium();
    let flights = one_flight(&[("A", 150), ("B", 150)]);
    let client = sim.add_agent(ProtocolAgent::client("c", flights.clone(), RetransmissionPolicy::Disabled));
    let server = sim.add_agent(ProtocolAgent::server("s", flights, RetransmissionPolicy::Disabled));
    sim.register(client, id, None).unwrap();
    sim.register(server, id, None).unwrap();

    sim.trigger(client).unwrap();
    sim.run().unwrap();

    let server = sim.agent(server).unwrap();
    assert_eq!(server.rx_time(0, 0), &[SimTime::from_secs(0.5)]);
    assert_eq!(server.rx_time(0, 1), &[SimTime::from_secs(1.5)]);
    assert_eq!(server.done_at(), Some(SimTime::from_secs(1.5)));
    // The gap counts as blocked time but not as airtime
    assert_eq!(sim.medium(id).unwrap().usage(None), 1.0);
    assert_eq!(sim.now(), SimTime::from_secs(2.0));
}

#[test]
fn test_slot_boundary_delays_transmission() {
    let medium = MediumConfig {
        msg_slot_distance: Some(1.0),
        ..rate(300.0)
    };
    let mut sim = Simulation::new(&config(medium)).unwrap();
    let id = sim.primary_medium();
    let flights = one_flight(&[("A", 150)]);
    let client = sim.add_agent(ProtocolAgent::client("c", flights.clone(), RetransmissionPolicy::Disabled));
    let server = sim.add_agent(ProtocolAgent::server("s", flights, RetransmissionPolicy::Disabled));
    sim.register(client, id, None).unwrap();
    sim.register(server, id, None).unwrap();

    sim.trigger_at(client, SimTime::from_secs(0.25)).unwrap();
    sim.run().unwrap();

    // Next boundary at 1.0, then 0.5 s of airtime
    let server = sim.agent(server).unwrap();
    assert_eq!(server.done_at(), Some(SimTime::from_secs(1.5)));
}

#[test]
fn test_priority_decides_who_transmits_first() {
    let sink = MemoryLogSink::new();
    let mut sim = Simulation::new(&config(rate(300.0)))
        .unwrap()
        .with_log_sink(sink.clone());
    let id = sim.primary_medium();

    let flights = one_flight(&[("Hello", 30)]);
    let mut clients = Vec::new();
    for (name, priority) in [("p2", 2), ("p0", 0), ("p1", 1)] {
        let client = sim.add_agent(ProtocolAgent::client(name, flights.clone(), RetransmissionPolicy::Disabled));
        sim.register(client, id, Some(priority)).unwrap();
        clients.push(client);
    }
    let noise = sim.add_agent(BlockingAgent::new("noise", BlockingAgentConfig::default()).unwrap());
    sim.register(noise, id, None).unwrap();

    // Noise holds the medium while everyone queues up
    sim.start(noise).unwrap();
    sim.run_step().unwrap();
    assert!(sim.medium(id).unwrap().is_blocked());
    for client in &clients {
        sim.trigger(*client).unwrap();
    }

    sim.run_until(SimTime::from_secs(0.5)).unwrap();
    sim.stop(noise).unwrap();
    sim.run().unwrap();

    let order: Vec<String> = sink
        .matching(" sending Hello")
        .iter()
        .filter_map(|line| line.split_whitespace().next().map(str::to_string))
        .collect();
    assert_eq!(order, vec!["p0", "p1", "p2"]);
    assert_eq!(
        sim.medium(id).unwrap().arbitration_order(),
        vec![clients[1].id(), clients[2].id(), clients[0].id(), noise.id()]
    );
}

#[test]
fn test_agent_must_register_before_sending() {
    let mut sim = Simulation::new(&SimulationConfig::deterministic_testing()).unwrap();
    let client = sim.add_agent(ProtocolAgent::client(
        "lonely",
        FlightStructure::dtls_abbreviated(),
        RetransmissionPolicy::exponential(),
    ));

    let result = sim.trigger(client);
    assert!(matches!(result, Err(SimulationError::NotRegistered { .. })));
}

#[test]
fn test_lossy_medium_reports_losses() {
    let medium = MediumConfig::default().with_msg_loss_rate(1.0);
    let sink = MemoryLogSink::new();
    let mut sim = Simulation::new(&config(medium))
        .unwrap()
        .with_log_sink(sink.clone());
    let id = sim.primary_medium();
    let flights = one_flight(&[("A", 10)]);
    let client = sim.add_agent(ProtocolAgent::client("c", flights.clone(), RetransmissionPolicy::Disabled));
    let server = sim.add_agent(ProtocolAgent::server("s", flights, RetransmissionPolicy::Disabled));
    sim.register(client, id, None).unwrap();
    sim.register(server, id, None).unwrap();

    sim.trigger(client).unwrap();
    sim.run().unwrap();

    let report = sim.report();
    assert_eq!(report.transmissions, 1);
    assert_eq!(report.losses, 1);
    assert!(!report.completed());
    assert_eq!(sink.matching("A(L=10) to s lost").len(), 1);
    assert_eq!(sink.matching("loss prob. = 1.0000").len(), 1);
}

#[test]
fn test_blocker_usage_is_accounted() {
    let mut sim = Simulation::new(&SimulationConfig::deterministic_testing()).unwrap();
    let id = sim.primary_medium();
    let noise = sim.add_agent(
        BlockingAgent::new(
            "noise",
            BlockingAgentConfig {
                frequency: 2.0,
                duration: 0.25,
                min_sep_time: 0.0,
                queuing: true,
            },
        )
        .unwrap(),
    );
    sim.register(noise, id, Some(0)).unwrap();
    sim.start(noise).unwrap();

    // Ticks at 0.0, 0.5, 1.0 and 1.5
    sim.run_until(SimTime::from_secs(1.75)).unwrap();
    sim.stop(noise).unwrap();
    sim.run().unwrap();

    let noise = sim.agent(noise).unwrap();
    assert_eq!(noise.occupancies(), 4);
    assert_eq!(noise.missed_requests(), 0);
    assert_eq!(sim.medium(id).unwrap().usage(None), 1.0);
}
