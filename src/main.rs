//! goban-mcts command line.
//!
//! - `goban-mcts demo` - Search an empty board and print the result
//! - `goban-mcts selfplay` - Play a game against itself to two passes

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::info;

use goban_mcts::constants::{DEFAULT_KOMI, MAX_BOARD_SIZE, MIN_BOARD_SIZE};
use goban_mcts::evaluator::{CachedEvaluator, UniformEvaluator};
use goban_mcts::mcts::Search;
use goban_mcts::parameters::Parameters;
use goban_mcts::position::Position;
use goban_mcts::scoring::compute_final_score;
use goban_mcts::zobrist::ZobristTable;

/// goban-mcts: Go rules engine and parallel MCTS
#[derive(Parser)]
#[command(name = "goban-mcts")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search one position and print the best move
    Demo(GameArgs),
    /// Play a game against itself until both sides pass
    Selfplay(GameArgs),
}

#[derive(Args, Clone)]
struct GameArgs {
    /// Board size
    #[arg(long, default_value_t = 9)]
    board_size: usize,
    /// Playouts per move
    #[arg(long, default_value_t = 800)]
    playouts: usize,
    /// Search threads
    #[arg(long, default_value_t = 2)]
    threads: usize,
    #[arg(long, default_value_t = DEFAULT_KOMI)]
    komi: f32,
    /// Use Gumbel root selection
    #[arg(long)]
    gumbel: bool,
    /// Stop self-play after this many moves
    #[arg(long, default_value_t = 200)]
    max_moves: usize,
}

impl Default for GameArgs {
    fn default() -> Self {
        Self {
            board_size: 9,
            playouts: 800,
            threads: 2,
            komi: DEFAULT_KOMI,
            gumbel: false,
            max_moves: 200,
        }
    }
}

impl GameArgs {
    fn build_search(&self) -> Result<Search<CachedEvaluator<UniformEvaluator>>> {
        if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&self.board_size) {
            bail!(
                "board size {} outside {MIN_BOARD_SIZE}..={MAX_BOARD_SIZE}",
                self.board_size
            );
        }
        let params = Parameters {
            threads: self.threads,
            playouts: self.playouts,
            gumbel: self.gumbel,
            ..Parameters::default()
        };
        let mut pos = Position::new(self.board_size, Arc::new(ZobristTable::default()));
        pos.set_komi(self.komi);
        let evaluator = CachedEvaluator::new(UniformEvaluator::default(), params.cache_size);
        Search::new(pos, evaluator, params).context("failed to start search")
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Selfplay(args)) => run_selfplay(&args),
        Some(Commands::Demo(args)) => run_demo(&args),
        None => run_demo(&GameArgs::default()),
    }
}

fn run_demo(args: &GameArgs) -> Result<()> {
    let mut search = args.build_search()?;
    let result = search.computation(args.playouts)?;
    let pos = search.position();

    println!("{pos}");
    println!("Best move: {}", pos.vertex_to_text(result.best_move));
    println!("Winrate: {:.1}%", 100.0 * result.root_eval);
    println!("Score: {:.1}", result.root_final_score);
    println!(
        "Playouts: {} in {:.2}s",
        result.playouts,
        result.elapsed.as_secs_f32()
    );
    println!(
        "Evaluator cache: {} hits, {} misses",
        search.evaluator().hits(),
        search.evaluator().misses()
    );
    Ok(())
}

fn run_selfplay(args: &GameArgs) -> Result<()> {
    let mut search = args.build_search()?;

    while search.position().passes() < 2 && search.position().move_number() < args.max_moves {
        let result = search.computation(args.playouts)?;
        let mv = result.random_move;
        info!(
            "move {}: {} {}",
            search.position().move_number() + 1,
            search.position().to_move(),
            search.position().vertex_to_text(mv)
        );
        search
            .play_move(mv)
            .with_context(|| format!("engine chose illegal move {mv}"))?;
    }

    let pos = search.position();
    println!("{pos}");
    let score = compute_final_score(pos, pos.komi());
    let winner = if score > 0.0 { "B" } else { "W" };
    println!("Result: {winner}+{:.1}", score.abs());
    Ok(())
}
