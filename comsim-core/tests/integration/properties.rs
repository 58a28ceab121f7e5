//! Randomized properties of the engine, the loss model and the handshake.

use comsim_core::{
    EventPriority, FlightStructure, MediumConfig, Message, ProtocolAgent, ProtocolMessage,
    RetransmissionPolicy, Scheduler, Simulation, SimulationConfig, SimTime,
};
use proptest::prelude::*;

fn priority() -> impl Strategy<Value = EventPriority> {
    prop_oneof![
        Just(EventPriority::High),
        Just(EventPriority::Normal),
        Just(EventPriority::Low),
    ]
}

proptest! {
    #[test]
    fn test_scheduler_pops_in_time_priority_fifo_order(
        entries in prop::collection::vec((0u32..20, priority()), 1..60)
    ) {
        let mut scheduler = Scheduler::new();
        for (index, (time, priority)) in entries.iter().enumerate() {
            scheduler
                .schedule_at(index, SimTime::from_secs(f64::from(*time) * 0.5), *priority)
                .unwrap();
        }

        let mut popped = Vec::new();
        while let Some(event) = scheduler.pop_next().unwrap() {
            prop_assert_eq!(scheduler.now(), event.time);
            popped.push((event.time, event.priority, event.event));
        }

        prop_assert_eq!(popped.len(), entries.len());
        for pair in popped.windows(2) {
            let (time_a, priority_a, index_a) = pair[0];
            let (time_b, priority_b, index_b) = pair[1];
            prop_assert!((time_a, priority_a) <= (time_b, priority_b));
            if (time_a, priority_a) == (time_b, priority_b) {
                prop_assert!(index_a < index_b);
            }
        }
    }

    #[test]
    fn test_loss_probability_grows_with_length(
        bit_loss_rate in 0.0f64..0.01,
        msg_loss_rate in 0.0f64..=1.0,
        short in 0usize..500,
        extra in 0usize..500,
    ) {
        let config = SimulationConfig {
            seed: 0,
            medium: MediumConfig::default()
                .with_bit_loss_rate(bit_loss_rate)
                .with_msg_loss_rate(msg_loss_rate),
        };
        let sim = Simulation::new(&config).unwrap();
        let medium = sim.medium(sim.primary_medium()).unwrap();

        let p_short = medium.loss_probability(&Message::Protocol(ProtocolMessage::new("s", short)));
        let p_long = medium.loss_probability(&Message::Protocol(ProtocolMessage::new("l", short + extra)));

        prop_assert!((0.0..=1.0).contains(&p_short));
        prop_assert!(p_short <= p_long + 1e-12);
        prop_assert!(p_short >= msg_loss_rate - 1e-12);
        prop_assert_eq!(medium.loss_probability(&Message::plain("p")), 0.0);
    }

    #[test]
    fn test_loss_probability_grows_with_rates(
        bit_low in 0.0f64..0.01,
        bit_extra in 0.0f64..0.01,
        msg_low in 0.0f64..=1.0,
        msg_extra in 0.0f64..=1.0,
        length in 0usize..2000,
    ) {
        let loss = |bit_loss_rate: f64, msg_loss_rate: f64| {
            let config = SimulationConfig {
                seed: 0,
                medium: MediumConfig::default()
                    .with_bit_loss_rate(bit_loss_rate)
                    .with_msg_loss_rate(msg_loss_rate),
            };
            let sim = Simulation::new(&config).unwrap();
            let medium = sim.medium(sim.primary_medium()).unwrap();
            medium.loss_probability(&Message::Protocol(ProtocolMessage::new("m", length)))
        };

        let msg_high = (msg_low + msg_extra).min(1.0);
        let p_low = loss(bit_low, msg_low);
        let p_high = loss(bit_low + bit_extra, msg_high);

        prop_assert!(p_low <= p_high + 1e-12);
        prop_assert!(loss(bit_low, msg_high) <= p_high + 1e-12);
        prop_assert!(loss(bit_low + bit_extra, msg_low) <= p_high + 1e-12);
    }

    #[test]
    fn test_fragments_cover_message(
        length in 0usize..5000,
        payload_len in 1usize..600,
        overhead in 0usize..32,
    ) {
        let message = ProtocolMessage::new("Certificate", length);
        let fragments = message.fragment(payload_len, overhead).unwrap();

        prop_assert_eq!(fragments.len(), length.div_ceil(payload_len));
        let total: usize = fragments.iter().map(ProtocolMessage::length).sum();
        prop_assert_eq!(total, length + fragments.len() * overhead);
        for (index, fragment) in fragments.iter().enumerate() {
            prop_assert!(fragment.length() <= payload_len + overhead);
            prop_assert!(fragment.length() > overhead);
            prop_assert_eq!(fragment.name(), format!("Certificate.f{index}"));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_handshake_is_safe_and_live_under_loss(
        seed in any::<u64>(),
        msg_loss_rate in 0.0f64..0.4,
    ) {
        let config = SimulationConfig {
            seed,
            medium: MediumConfig::low_rate_radio().with_msg_loss_rate(msg_loss_rate),
        };
        let flights = FlightStructure::dtls_certificate();
        let policy = RetransmissionPolicy::exponential();

        let mut sim = Simulation::new(&config).unwrap();
        let medium = sim.primary_medium();
        let server = sim.add_agent(ProtocolAgent::server("server1", flights.clone(), policy.clone()));
        let client = sim.add_agent(ProtocolAgent::client("client1", flights.clone(), policy));
        sim.register(server, medium, None).unwrap();
        sim.register(client, medium, None).unwrap();

        sim.trigger(client).unwrap();
        sim.run().unwrap();

        let client = sim.agent(client).unwrap();
        let server = sim.agent(server).unwrap();

        prop_assert!(client.is_done());
        prop_assert!(!server.is_done());
        prop_assert!(server.tx_count(3) >= 1);
        prop_assert!(client.rx_count(3).iter().all(|&count| count > 0));
        // Nothing completes faster than its airtime
        let airtime: usize = (0..flights.len()).map(|f| flights.flight_length(f)).sum();
        let done_at = client.done_at().unwrap().as_secs();
        prop_assert!(done_at + 1e-9 >= airtime as f64 / 300.0);
        prop_assert!(sim.is_idle());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_bounded_handshake_never_skips_a_flight(
        seed in any::<u64>(),
        msg_loss_rate in 0.0f64..1.0,
        max_attempts in 0usize..4,
    ) {
        let config = SimulationConfig {
            seed,
            medium: MediumConfig::low_rate_radio().with_msg_loss_rate(msg_loss_rate),
        };
        let flights = FlightStructure::dtls_certificate();
        let policy = RetransmissionPolicy::exponential().with_max_attempts(max_attempts);

        let mut sim = Simulation::new(&config).unwrap();
        let medium = sim.primary_medium();
        let server = sim.add_agent(ProtocolAgent::server("server1", flights.clone(), policy.clone()));
        let client = sim.add_agent(ProtocolAgent::client("client1", flights.clone(), policy));
        sim.register(server, medium, None).unwrap();
        sim.register(client, medium, None).unwrap();

        sim.trigger(client).unwrap();
        sim.run().unwrap();
        prop_assert!(sim.is_idle());

        let client = sim.agent(client).unwrap();
        let server = sim.agent(server).unwrap();
        let owner = |flight: usize| if flight % 2 == 0 { client } else { server };
        let receiver = |flight: usize| if flight % 2 == 0 { server } else { client };

        for flight in 0..flights.len() {
            prop_assert!(owner(flight).tx_count(flight) as usize <= max_attempts + 1 || flight == flights.last());
            // A flight goes out only after its predecessor fully arrived
            if flight > 0 && owner(flight).tx_count(flight) > 0 {
                prop_assert!(receiver(flight - 1).rx_count(flight - 1).iter().all(|&count| count > 0));
            }
        }

        if client.is_done() {
            for flight in 0..flights.len() {
                prop_assert!(owner(flight).tx_count(flight) >= 1);
                prop_assert!(receiver(flight).rx_count(flight).iter().all(|&count| count > 0));
            }
        }
        prop_assert!(!server.is_done());
    }
}
