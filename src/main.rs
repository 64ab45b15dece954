use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use open_radio::{
    audio::{
        player::Player,
        queue::LoopMode,
        source::StreamOpener,
        transport::{Destination, UdpTransport, VoiceConnection},
    },
    cache::StreamCache,
    config::Config,
    radio::RadioService,
    sources::DirectResolver,
    storage::JsonSongStore,
};

const CONSOLE_USER: &str = "console";

const HELP: &str = "\
Comandos:
  play <url|path> [destination]   agrega un track a la cola
  connect <destination>           conecta a un destino de voz
  pause | resume | skip | stop    controla la reproducción
  disconnect                      sale del destino y limpia la cola
  loop <off|one|queue>            cambia el modo loop
  radio <on|off> [destination]    activa o desactiva la radio
  random [n]                      lista tracks aleatorios de la biblioteca
  status                          muestra el estado del reproductor
  stats                           muestra estadísticas de la biblioteca
  quit                            salir";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_radio=debug".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Radio v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    let store = Arc::new(JsonSongStore::open(&config.data_dir).await?);
    let cache = StreamCache::new(config.stream_cache_size, Some(config.stream_cache_ttl()));
    let mut resolver = DirectResolver::new(config.http_timeout(), cache)?;
    if let Some(bps) = config.bytes_per_second {
        resolver = resolver.with_bytes_per_second(bps);
    }

    let opener = StreamOpener::new(config.frame_size, config.read_chunk_size, config.http_timeout())?;
    let connection = Arc::new(VoiceConnection::new(Arc::new(UdpTransport::default())));
    let player = Player::new(connection, Arc::new(opener), config.frame_duration());

    let service = RadioService::new(
        player,
        store.clone(),
        Arc::new(resolver),
        config.radio_max_attempts,
    );
    service.subscribe_errors(|e| error!("🚨 {}", e));

    info!("🚀 Listo. Escribe 'help' para ver los comandos");
    let console = Console {
        service: service.clone(),
        store,
        default_destination: config.default_destination(),
    };

    tokio::select! {
        result = console.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("⚠️ Señal de apagado recibida"),
    }

    service.disconnect().await;
    info!("👋 Hasta luego");
    Ok(())
}

struct Console {
    service: RadioService,
    store: Arc<JsonSongStore>,
    default_destination: Option<Destination>,
}

impl Console {
    async fn run(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "quit" | "exit") {
                break;
            }
            if let Err(e) = self.execute(line).await {
                warn!("❌ {}", e);
            }
        }
        Ok(())
    }

    /// Destino indicado en el comando, o el configurado
    fn destination(&self, arg: Option<&str>) -> Result<Option<Destination>> {
        match arg {
            Some(arg) => Ok(Some(arg.parse().map_err(anyhow::Error::msg)?)),
            None if self.service.player().is_connected() => Ok(None),
            None => Ok(self.default_destination.clone()),
        }
    }

    async fn execute(&self, line: &str) -> Result<()> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match command {
            "help" => println!("{HELP}"),
            "play" => {
                let Some(query) = args.first() else {
                    anyhow::bail!("usage: play <url|path> [destination]");
                };
                let destination = self.destination(args.get(1).copied())?;
                let outcome = self
                    .service
                    .play(query, Some(CONSOLE_USER), destination.as_ref())
                    .await?;
                match outcome.play_count {
                    Some(count) => println!(
                        "➕ {} [{}] (reproducido {} veces)",
                        outcome.track,
                        outcome.track.display_duration(),
                        count
                    ),
                    None => println!("➕ {} [{}]", outcome.track, outcome.track.display_duration()),
                }
            }
            "connect" => {
                let Some(destination) = self.destination(args.first().copied())? else {
                    anyhow::bail!("usage: connect <destination>");
                };
                self.service.player().connect(&destination).await?;
                println!("🔊 Conectado a {destination}");
            }
            "pause" => self.service.pause().await?,
            "resume" => self.service.resume().await?,
            "skip" => self.service.skip().await?,
            "stop" => self.service.stop().await,
            "disconnect" => self.service.disconnect().await,
            "loop" => {
                let mode: LoopMode = args
                    .first()
                    .copied()
                    .unwrap_or("off")
                    .parse()
                    .map_err(anyhow::Error::msg)?;
                self.service.set_loop(mode);
            }
            "radio" => {
                let enabled = match args.first().copied() {
                    Some("on") => true,
                    Some("off") => false,
                    _ => !self.service.radio_enabled(),
                };
                let destination = self.destination(args.get(1).copied())?;
                self.service.set_radio(enabled, destination.as_ref()).await?;
            }
            "random" => {
                let n = match args.first() {
                    Some(n) => n.parse()?,
                    None => 5,
                };
                for track in self.service.random(n).await? {
                    println!("🎲 {} ({} reproducciones)", track, track.play_count);
                }
            }
            "status" => println!("{}", serde_json::to_string_pretty(&self.service.status())?),
            "stats" => println!("{}", self.store.stats().await),
            other => anyhow::bail!("unknown command '{other}', type 'help'"),
        }
        Ok(())
    }
}
