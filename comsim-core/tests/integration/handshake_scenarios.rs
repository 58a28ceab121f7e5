//! Complete handshakes under loss, interference and retransmission limits.

use comsim_core::{
    AgentHandle, BlockingAgent, BlockingAgentConfig, FlightStructure, MediumConfig,
    MemoryLogSink, Message, ProtocolAgent, ProtocolMessage, RetransmissionPolicy, RunReport,
    Simulation, SimulationConfig, SimTime,
};

struct Setup {
    sim: Simulation,
    client: AgentHandle<ProtocolAgent>,
    server: AgentHandle<ProtocolAgent>,
    sink: MemoryLogSink,
}

fn setup(config: SimulationConfig, flights: FlightStructure, policy: RetransmissionPolicy) -> Setup {
    let sink = MemoryLogSink::new();
    let mut sim = Simulation::new(&config).unwrap().with_log_sink(sink.clone());
    let medium = sim.primary_medium();
    let server = sim.add_agent(ProtocolAgent::server("server1", flights.clone(), policy.clone()));
    let client = sim.add_agent(ProtocolAgent::client("client1", flights, policy));
    sim.register(server, medium, None).unwrap();
    sim.register(client, medium, None).unwrap();
    Setup {
        sim,
        client,
        server,
        sink,
    }
}

fn four_flights() -> FlightStructure {
    FlightStructure::new(vec![
        vec![ProtocolMessage::new("A", 100)],
        vec![ProtocolMessage::new("B", 50), ProtocolMessage::new("C", 50)],
        vec![ProtocolMessage::new("D", 100)],
        vec![ProtocolMessage::new("E", 100)],
    ])
    .unwrap()
}

fn lossy(seed: u64, msg_loss_rate: f64) -> SimulationConfig {
    SimulationConfig {
        seed,
        medium: MediumConfig::low_rate_radio().with_msg_loss_rate(msg_loss_rate),
    }
}

fn run_certificate_handshake(seed: u64, msg_loss_rate: f64) -> RunReport {
    let mut setup = setup(
        lossy(seed, msg_loss_rate),
        FlightStructure::dtls_certificate(),
        RetransmissionPolicy::exponential(),
    );
    setup.sim.trigger(setup.client).unwrap();
    setup.sim.run().unwrap();
    setup.sim.report()
}

#[test]
fn test_lossless_handshake_completes_after_airtime() {
    let config = SimulationConfig {
        seed: 1,
        medium: MediumConfig {
            data_rate: Some(100.0),
            ..Default::default()
        },
    };
    let mut setup = setup(config, four_flights(), RetransmissionPolicy::exponential());

    setup.sim.trigger(setup.client).unwrap();
    setup.sim.run().unwrap();

    let client = setup.sim.agent(setup.client).unwrap();
    let server = setup.sim.agent(setup.server).unwrap();

    // 1.0 + 0.5 + 0.5 + 1.0 + 1.0 seconds of airtime back to back
    assert!(client.is_done());
    assert_eq!(client.done_at(), Some(SimTime::from_secs(4.0)));
    assert!(!server.is_done());
    assert_eq!(server.current_flight(), 3);
    for flight in 0..4 {
        let sender = if flight % 2 == 0 { client } else { server };
        assert_eq!(sender.tx_count(flight), 1);
    }
    assert_eq!(client.retransmissions() + server.retransmissions(), 0);
    assert_eq!(client.tx_bytes(), 200);
    assert_eq!(client.rx_bytes(), 200);
    assert_eq!(server.tx_bytes(), 200);

    // Remaining timeouts fire at 10, 11 and 12 and find their flights answered
    assert_eq!(setup.sim.now(), SimTime::from_secs(12.0));
    assert!(setup.sink.matching("timeout for flight").is_empty());
}

#[test]
fn test_transcript_format() {
    let mut setup = setup(
        SimulationConfig::default(),
        FlightStructure::dtls_certificate(),
        RetransmissionPolicy::exponential(),
    );
    setup.sim.trigger(setup.client).unwrap();
    setup.sim.run().unwrap();

    let records = setup.sink.records();
    assert_eq!(records[0].header, "[0.000]");
    assert_eq!(records[0].text, "client1 starting handshake");
    assert_eq!(records[1].header, "");
    assert!(records.iter().all(|r| r.header.is_empty() || r.header.starts_with('[')));

    assert_eq!(
        setup
            .sink
            .matching("client1 sending ClientHello(L=87) (loss prob. = 0.0000)")
            .len(),
        1
    );
    assert_eq!(
        setup
            .sink
            .matching("server1 received ClientHello(L=87) from client1")
            .len(),
        1
    );
    assert_eq!(setup.sink.matching("client1 handshake complete").len(), 1);
}

#[test]
fn test_handshake_survives_loss() {
    let mut last_flight_repeated = false;
    for seed in 0..40 {
        let report = run_certificate_handshake(seed, 0.3);
        let client = &report.agents[1];
        let server = &report.agents[0];

        assert!(client.done, "seed {seed} did not complete");
        assert!(!server.done);
        assert!(report.losses > 0 || report.transmissions == 13);
        // Completion implies every message of the last flight arrived
        assert!(client.flights[3].messages.iter().all(|m| m.rx_count > 0));
        last_flight_repeated |= server.flights[3].tx_count > 1;
    }
    assert!(last_flight_repeated);
}

#[test]
fn test_lost_last_flight_repeated_on_penultimate_retransmission() {
    let run_seed = |seed| {
        let mut setup = setup(
            lossy(seed, 0.3),
            FlightStructure::dtls_certificate(),
            RetransmissionPolicy::exponential(),
        );
        setup.sim.trigger(setup.client).unwrap();
        setup.sim.run().unwrap();
        let server = setup.sim.agent(setup.server).unwrap();
        (
            server.tx_count(3),
            setup.sink.matching("received penultimate flight again").len(),
        )
    };

    for seed in 0..40 {
        let (last_flight_sent, implicit_acks) = run_seed(seed);
        // Every repetition of the last flight is caused by a repeated penultimate flight
        assert_eq!(last_flight_sent as usize, implicit_acks + 1);
    }
}

#[test]
fn test_same_seed_same_run() {
    assert_eq!(
        run_certificate_handshake(7, 0.2),
        run_certificate_handshake(7, 0.2)
    );
}

#[test]
fn test_disabled_policy_stalls_on_loss() {
    let mut setup = setup(
        lossy(3, 1.0),
        FlightStructure::dtls_certificate(),
        RetransmissionPolicy::Disabled,
    );
    setup.sim.trigger(setup.client).unwrap();
    setup.sim.run().unwrap();

    let client = setup.sim.agent(setup.client).unwrap();
    let server = setup.sim.agent(setup.server).unwrap();
    assert!(!client.is_done());
    assert_eq!(client.tx_count(0), 1);
    assert_eq!(server.current_flight(), 0);
    assert_eq!(setup.sink.matching("gives up retransmitting flight 0").len(), 1);
    assert!(setup.sim.is_idle());
}

#[test]
fn test_retransmission_budget_is_respected() {
    let config = SimulationConfig {
        seed: 5,
        medium: MediumConfig::default().with_msg_loss_rate(1.0),
    };
    let mut setup = setup(
        config,
        four_flights(),
        RetransmissionPolicy::exponential().with_max_attempts(3),
    );
    setup.sim.trigger(setup.client).unwrap();
    setup.sim.run().unwrap();

    let client = setup.sim.agent(setup.client).unwrap();
    assert_eq!(client.tx_count(0), 4);
    // Timeouts of 10, 20 and 40 seconds without airtime
    assert_eq!(setup.sim.now(), SimTime::from_secs(70.0));
    assert_eq!(setup.sink.matching("client1 timeout for flight 0").len(), 3);
}

#[test]
fn test_linear_policy_timeouts() {
    let config = SimulationConfig {
        seed: 5,
        medium: MediumConfig::default().with_msg_loss_rate(1.0),
    };
    let mut setup = setup(
        config,
        four_flights(),
        RetransmissionPolicy::linear().with_max_attempts(3),
    );
    setup.sim.trigger(setup.client).unwrap();
    setup.sim.run().unwrap();

    // 10 + 20 + 30
    assert_eq!(setup.sim.now(), SimTime::from_secs(60.0));
}

#[test]
fn test_interference_stops_on_completion() {
    let sink = MemoryLogSink::new();
    let mut sim = Simulation::new(&SimulationConfig::default())
        .unwrap()
        .with_log_sink(sink.clone());
    let medium = sim.primary_medium();
    let flights = FlightStructure::dtls_certificate();
    let policy = RetransmissionPolicy::exponential();

    let noise = sim.add_agent(
        BlockingAgent::new(
            "noise",
            BlockingAgentConfig {
                frequency: 10.0,
                duration: 0.05,
                min_sep_time: 0.01,
                queuing: false,
            },
        )
        .unwrap(),
    );
    let noise_id = noise.id();
    let server = sim.add_agent(ProtocolAgent::server("server1", flights.clone(), policy.clone()));
    let client = sim.add_agent(
        ProtocolAgent::client("client1", flights.clone(), policy)
            .with_completion_hook(move |ctx| ctx.request_stop(noise_id)),
    );
    sim.register(noise, medium, Some(0)).unwrap();
    sim.register(server, medium, None).unwrap();
    sim.register(client, medium, None).unwrap();

    sim.start(noise).unwrap();
    sim.trigger(client).unwrap();
    sim.run().unwrap();

    let client = sim.agent(client).unwrap();
    let noise = sim.agent(noise).unwrap();
    assert!(client.is_done());
    assert!(!noise.is_running());
    assert!(noise.occupancies() > 0);

    let airtime: usize = (0..flights.len()).map(|f| flights.flight_length(f)).sum();
    let undisturbed = airtime as f64 / 300.0 + 0.001 * 12.0;
    let done_at = client.done_at().unwrap().as_secs();
    assert!(done_at > undisturbed);
    assert_eq!(sink.matching("noise stopped").len(), 1);
    assert!(sim.medium(medium).unwrap().usage(Some(noise_id)) > 0.0);
}

#[test]
fn test_interference_settles_when_hooked_side_never_completes() {
    let mut sim = Simulation::new(&SimulationConfig::default()).unwrap();
    let medium = sim.primary_medium();
    let flights = FlightStructure::dtls_abbreviated();
    let policy = RetransmissionPolicy::exponential();

    let noise = sim.add_agent(BlockingAgent::new("noise", BlockingAgentConfig::short_bursts()).unwrap());
    let noise_id = noise.id();
    let server = sim.add_agent(ProtocolAgent::server("server1", flights.clone(), policy.clone()));
    // Sends the last flight of three, so this hook never runs
    let client = sim.add_agent(
        ProtocolAgent::client("client1", flights, policy)
            .with_completion_hook(move |ctx| ctx.request_stop(noise_id)),
    );
    sim.register(noise, medium, Some(0)).unwrap();
    sim.register(server, medium, None).unwrap();
    sim.register(client, medium, None).unwrap();

    sim.start(noise).unwrap();
    sim.trigger(client).unwrap();
    sim.run_until_settled().unwrap();

    assert!(sim.agent(server).unwrap().is_done());
    assert!(!sim.agent(client).unwrap().is_done());
    assert!(!sim.agent(noise).unwrap().is_running());
    assert!(sim.is_idle());
}

#[test]
fn test_fragmented_handshake() {
    let flights = FlightStructure::dtls_certificate().fragmented(64, 13).unwrap();
    let mut setup = setup(
        SimulationConfig::default(),
        flights.clone(),
        RetransmissionPolicy::exponential(),
    );
    setup.sim.trigger(setup.client).unwrap();
    setup.sim.run().unwrap();

    let client = setup.sim.agent(setup.client).unwrap();
    let server = setup.sim.agent(setup.server).unwrap();
    assert!(client.is_done());
    assert_eq!(
        client.rx_bytes() as usize,
        flights.flight_length(1) + flights.flight_length(3)
    );
    assert_eq!(
        server.rx_bytes() as usize,
        flights.flight_length(0) + flights.flight_length(2)
    );
}

#[test]
fn test_plain_message_alongside_handshake() {
    let mut setup = setup(
        SimulationConfig::default(),
        FlightStructure::dtls_abbreviated(),
        RetransmissionPolicy::exponential(),
    );
    let server_id = setup.server.id();
    setup
        .sim
        .send(setup.client, Message::plain("wakeup"), Some(server_id))
        .unwrap();
    setup.sim.trigger(setup.client).unwrap();
    setup.sim.run().unwrap();

    // Three flights: the server receives the last one
    let server = setup.sim.agent(setup.server).unwrap();
    assert!(server.is_done());
    assert_eq!(setup.sink.matching("server1 received wakeup from client1").len(), 1);
}

#[test]
fn test_report_serializes() {
    let report = run_certificate_handshake(2, 0.1);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["seed"], 2);
    assert_eq!(json["agents"].as_array().unwrap().len(), 2);
    assert_eq!(json["agents"][1]["role"], "client");
    assert!(report.summary().contains("Handshake completed at"));
}
