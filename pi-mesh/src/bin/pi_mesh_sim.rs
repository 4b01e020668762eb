use std::path::PathBuf;
use std::time::Duration;

use pi_mesh::net::MockMesh;
use pi_mesh::runtime::tokio_runtime::TokioRuntime;
use pi_mesh::{Face, MeshConfigBuilder, MeshRuntime, NodeDriver, NodeId, QuarterCircle};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Faces cabled between neighbours in the simulated line
const EAST: Face = Face(0);
const WEST: Face = Face(1);

fn usage() -> ! {
    eprintln!(
        "Usage: pi_mesh_sim [--nodes N] [--seconds S] [--target PERCENT] [--seed N] [config.json]"
    );
    eprintln!();
    eprintln!("Simulates N nodes cabled in a line. The first node's last face is the");
    eprintln!("terminal: it asks for the table and starts a calculation at PERCENT.");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  pi_mesh_sim --nodes 5 --target 99.9 --seconds 60");
    std::process::exit(2);
}

struct Args {
    nodes: usize,
    seconds: u64,
    target: String,
    seed: Option<u64>,
    config: Option<PathBuf>,
}

fn parse_args() -> Args {
    let mut args = Args {
        nodes: 3,
        seconds: 30,
        target: "99.9".to_string(),
        seed: None,
        config: None,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--nodes" => args.nodes = number(iter.next()),
            "--seconds" => args.seconds = number(iter.next()),
            "--target" => args.target = iter.next().unwrap_or_else(|| usage()),
            "--seed" => args.seed = Some(number(iter.next())),
            "-h" | "--help" => usage(),
            path if !path.starts_with('-') && args.config.is_none() => {
                args.config = Some(PathBuf::from(path));
            }
            _ => usage(),
        }
    }

    if args.nodes == 0 {
        usage();
    }
    args
}

fn number<N: std::str::FromStr>(value: Option<String>) -> N {
    value.and_then(|v| v.parse().ok()).unwrap_or_else(|| usage())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().compact())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = simulate(parse_args()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn simulate(args: Args) -> pi_mesh::Result<()> {
    let builder = match &args.config {
        Some(path) => MeshConfigBuilder::from_json_file(path)?,
        None => MeshConfigBuilder::new(),
    };
    let config = builder.build()?;
    if config.face_count < 3 {
        eprintln!("error: the simulator needs at least 3 faces (east, west, terminal)");
        std::process::exit(2);
    }
    let terminal = Face(config.face_count - 1);

    let mut mesh = MockMesh::new(args.nodes, config.face_count);
    for i in 1..args.nodes {
        mesh.connect(i - 1, EAST, i, WEST);
    }
    let mut screen = mesh.tap(0, terminal);
    let console = mesh.injector(0);

    let runtime = TokioRuntime::new();
    let mut seeds = StdRng::seed_from_u64(args.seed.unwrap_or_else(rand::random));
    for i in 0..args.nodes {
        let id = NodeId(0x0a00 + i as u32);
        let source = QuarterCircle::new(StdRng::seed_from_u64(seeds.next_u64()), config.radius);
        let driver = NodeDriver::new(
            id,
            config.clone(),
            mesh.endpoint(i),
            runtime.clone(),
            source,
        )?;
        runtime.spawn(async move {
            if let Err(err) = driver.run().await {
                tracing::error!(node = %id, error = %err, "driver stopped");
            }
        });
    }

    console.inject(terminal, b"t\n")?;
    console.inject(terminal, format!("d{}\n", args.target).as_bytes())?;

    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            frame = screen.recv() => match frame {
                Some(frame) => print!("{}", String::from_utf8_lossy(&frame)),
                None => break,
            },
            _ = &mut deadline => break,
        }
    }

    // Drivers are dropped with the Tokio runtime when main returns.
    Ok(())
}
