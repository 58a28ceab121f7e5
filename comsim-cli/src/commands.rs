//! CLI command implementations

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use comsim_core::{
    AgentHandle, BlockingAgent, BlockingAgentConfig, ConsoleLogSink, FlightStructure,
    MediumConfig, ProtocolAgent, RetransmissionPolicy, SimContext, Simulation, SimulationConfig,
    SimTime,
};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run one handshake between a client and a server
    Run(RunArgs),
    /// Print the messages of a flight structure
    Flights {
        /// Handshake variant
        #[arg(long, value_enum, default_value_t = Profile::Certificate)]
        profile: Profile,
        #[command(flatten)]
        fragmentation: FragmentationArgs,
    },
}

/// Handshake variants with preset message sizes
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Profile {
    /// Full handshake with certificates, four flights
    Certificate,
    /// Session resumption, three flights
    Abbreviated,
}

/// Optional splitting of every message into fragments
#[derive(Debug, Args)]
pub struct FragmentationArgs {
    /// Maximum payload bytes per fragment
    #[arg(long)]
    fragment_payload: Option<usize>,
    /// Header bytes added to every fragment
    #[arg(long, default_value = "13", requires = "fragment_payload")]
    fragment_overhead: usize,
}

/// Parameters of a single handshake run
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Seed for loss draws (defaults to COMSIM_SEED or 0)
    #[arg(long)]
    seed: Option<u64>,
    /// Probability that a whole message is lost
    #[arg(long)]
    msg_loss_rate: Option<f64>,
    /// Probability that a single bit is corrupted
    #[arg(long)]
    bit_loss_rate: Option<f64>,
    /// Channel rate in bytes per second
    #[arg(long)]
    data_rate: Option<f64>,
    /// Slot distance in seconds
    #[arg(long)]
    slot: Option<f64>,
    /// Idle gap after every message in seconds
    #[arg(long)]
    inter_msg_time: Option<f64>,
    /// Retransmission policy: exponential, linear or none
    #[arg(long, default_value = "exponential")]
    policy: RetransmissionPolicy,
    /// Give up after this many retransmissions per flight
    #[arg(long)]
    max_attempts: Option<usize>,
    /// Handshake variant
    #[arg(long, value_enum, default_value_t = Profile::Certificate)]
    profile: Profile,
    #[command(flatten)]
    fragmentation: FragmentationArgs,
    /// Add short-burst interference that stops when the handshake completes
    #[arg(long)]
    interference: bool,
    /// Print the event transcript
    #[arg(long)]
    transcript: bool,
    /// Print the report as JSON instead of a summary
    #[arg(long)]
    json: bool,
    /// Stop the run at this simulation time in seconds
    #[arg(long)]
    until: Option<f64>,
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run(args) => run_handshake(args),
        Commands::Flights {
            profile,
            fragmentation,
        } => print_flights(profile, &fragmentation),
    }
}

fn flight_structure(profile: Profile, fragmentation: &FragmentationArgs) -> Result<FlightStructure> {
    let flights = match profile {
        Profile::Certificate => FlightStructure::dtls_certificate(),
        Profile::Abbreviated => FlightStructure::dtls_abbreviated(),
    };

    match fragmentation.fragment_payload {
        Some(payload) => flights
            .fragmented(payload, fragmentation.fragment_overhead)
            .context("Failed to fragment flights"),
        None => Ok(flights),
    }
}

fn simulation_config(args: &RunArgs) -> SimulationConfig {
    let mut config = SimulationConfig::from_env();
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let medium: &mut MediumConfig = &mut config.medium;
    if let Some(rate) = args.msg_loss_rate {
        medium.msg_loss_rate = rate;
    }
    if let Some(rate) = args.bit_loss_rate {
        medium.bit_loss_rate = rate;
    }
    if let Some(rate) = args.data_rate {
        medium.data_rate = Some(rate);
    }
    if let Some(slot) = args.slot {
        medium.msg_slot_distance = Some(slot);
    }
    if let Some(gap) = args.inter_msg_time {
        medium.inter_msg_time = gap;
    }

    config
}

/// Simulation wired up for one CLI run.
struct Scenario {
    sim: Simulation,
    client: AgentHandle<ProtocolAgent>,
    server: AgentHandle<ProtocolAgent>,
    noise: Option<AgentHandle<BlockingAgent>>,
}

/// Builds the client, the server and the optional interferer.
///
/// Both sides stop the interferer on completion; which side completes
/// depends on the number of flights.
fn build_scenario(args: &RunArgs, config: &SimulationConfig) -> Result<Scenario> {
    let flights = flight_structure(args.profile, &args.fragmentation)?;
    let policy = match args.max_attempts {
        Some(max) => args.policy.clone().with_max_attempts(max),
        None => args.policy.clone(),
    };

    let mut sim = Simulation::new(config).context("Invalid medium configuration")?;
    if args.transcript {
        sim.set_log_sink(ConsoleLogSink);
    }
    let medium = sim.primary_medium();

    let noise = if args.interference {
        let blocker = BlockingAgent::new("interference", BlockingAgentConfig::short_bursts())
            .context("Invalid interference configuration")?;
        Some(sim.add_agent(blocker))
    } else {
        None
    };
    let noise_id = noise.map(|handle| handle.id());
    let stop_noise = move |ctx: &mut SimContext<'_>| {
        if let Some(noise) = noise_id {
            ctx.request_stop(noise);
        }
    };

    let server = sim.add_agent(
        ProtocolAgent::server("server1", flights.clone(), policy.clone())
            .with_completion_hook(stop_noise),
    );
    let client = sim.add_agent(
        ProtocolAgent::client("client1", flights, policy).with_completion_hook(stop_noise),
    );

    if let Some(noise) = noise {
        sim.register(noise, medium, Some(0))?;
    }
    sim.register(server, medium, None)?;
    sim.register(client, medium, None)?;

    Ok(Scenario {
        sim,
        client,
        server,
        noise,
    })
}

/// Run one handshake and print its report
///
/// Without `--until` the run ends once no protocol activity is left, so
/// interference cannot keep it alive after a completed or stalled handshake.
///
/// # Errors
/// - Invalid medium, interference or fragmentation parameters
/// - Any simulation error raised during the run
pub fn run_handshake(args: RunArgs) -> Result<()> {
    let config = simulation_config(&args);
    let mut scenario = build_scenario(&args, &config)?;
    let sim = &mut scenario.sim;

    info!(seed = config.seed, ?config.medium, "Running handshake");

    if let Some(noise) = scenario.noise {
        sim.start(noise)?;
    }
    sim.trigger(scenario.client)?;

    match args.until {
        Some(limit) => sim.run_until(SimTime::from_secs(limit))?,
        None => sim.run_until_settled()?,
    }

    let completed = [scenario.client, scenario.server]
        .into_iter()
        .any(|side| sim.agent(side).is_ok_and(ProtocolAgent::is_done));
    info!(completed, time = sim.now().as_secs(), "Run finished");

    let report = sim.report();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.summary());
    }

    Ok(())
}

/// Print every flight with its messages
///
/// # Errors
/// - Fragmentation parameters are invalid
pub fn print_flights(profile: Profile, fragmentation: &FragmentationArgs) -> Result<()> {
    let flights = flight_structure(profile, fragmentation)?;

    println!("{profile:?} handshake");
    println!("{:-<60}", "");
    for (index, messages) in flights.flights().iter().enumerate() {
        let sender = if index % 2 == 0 { "client" } else { "server" };
        println!(
            "Flight {index} ({sender}, {} bytes)",
            flights.flight_length(index)
        );
        for message in messages {
            println!("  {message}");
        }
    }

    Ok(())
}
