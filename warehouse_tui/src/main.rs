use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    io::{self, Stdout},
    path::PathBuf,
    time::{Duration, Instant},
};
use warehouse_core::{
    Position, Reward,
    environment::{Action, ResetMode, WarehouseEnv, WarehouseView},
    layout::Layout as WarehouseLayout,
    policy::{PlanningPolicy, Policy, RandomPolicy},
    rollout::evaluate,
    storage::Station,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyKind {
    /// Uniformly random actions
    Random,
    /// Shortest-path scripted expert
    Planner,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Layout file to load
    #[arg(short, long, value_name = "LAYOUT_FILE")]
    layout: Option<PathBuf>,
    /// Seed for transaction generation and the random policy
    #[arg(short, long)]
    seed: Option<u64>,
    /// Policy that drives the agent
    #[arg(short, long, value_enum, default_value_t = PolicyKind::Planner)]
    policy: PolicyKind,
    /// Run episodes without the terminal UI and print a summary
    #[arg(long)]
    headless: bool,
    /// Number of episodes in headless mode
    #[arg(long, default_value_t = 100)]
    episodes: usize,
    /// Step limit per episode
    #[arg(long, default_value_t = 200)]
    max_steps: usize,
    /// Milliseconds between simulation steps in the UI
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
}

struct App {
    /// The core simulation environment.
    environment: WarehouseEnv,
    /// Chooses the action for every tick.
    policy: Box<dyn Policy>,
    max_steps: usize,
    /// Flag to control the main loop.
    should_quit: bool,
    paused: bool,
    episode: usize,
    succeeded: usize,
    episode_steps: usize,
    last_action: Option<(Action, Reward)>,
}

impl App {
    fn new(mut environment: WarehouseEnv, policy: Box<dyn Policy>, max_steps: usize) -> Result<Self> {
        environment.reset(ResetMode::Strict)?;
        Ok(App {
            environment,
            policy,
            max_steps,
            should_quit: false,
            paused: false,
            episode: 1,
            succeeded: 0,
            episode_steps: 0,
            last_action: None,
        })
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) -> Result<()> {
        if self.paused {
            return Ok(());
        }
        let before = self.environment.observation();
        let action = self.policy.select_action(&self.environment);
        let step = self.environment.step(action)?;
        self.episode_steps += 1;
        self.last_action = self
            .environment
            .action_space()
            .decode(action)
            .map(|decoded| (decoded, step.reward));

        if step.done {
            self.succeeded += 1;
            self.next_episode()
        } else if step.observation == before || self.episode_steps >= self.max_steps {
            self.next_episode()
        } else {
            Ok(())
        }
    }

    /// Rolls a fresh transaction, discarding whatever the last episode left behind.
    fn next_episode(&mut self) -> Result<()> {
        self.environment.reset(ResetMode::Lenient)?;
        self.episode += 1;
        self.episode_steps = 0;
        Ok(())
    }

    fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    // If no layout file is provided, use the default layout
    let layout_file = args
        .layout
        .clone()
        .unwrap_or(PathBuf::from("layouts/three_bins.toml"));
    // Ensure the layout file exists
    if !layout_file.exists() {
        return Err(anyhow::anyhow!(
            "Layout file does not exist: {}",
            layout_file.display()
        ));
    }
    let source = std::fs::read_to_string(&layout_file)
        .with_context(|| format!("Failed to read layout file {}", layout_file.display()))?;
    let layout = WarehouseLayout::from_toml_str(&source)
        .with_context(|| format!("Invalid layout {}", layout_file.display()))?;

    let mut environment = match args.seed {
        Some(seed) => WarehouseEnv::with_seed(&layout, seed)?,
        None => WarehouseEnv::new(&layout)?,
    };
    let mut policy: Box<dyn Policy> = match args.policy {
        PolicyKind::Random => Box::new(args.seed.map_or_else(RandomPolicy::default, RandomPolicy::new)),
        PolicyKind::Planner => Box::new(PlanningPolicy::new()),
    };

    if args.headless {
        env_logger::init();
        info!(
            "Evaluating {:?} policy on {} for {} episodes",
            args.policy,
            layout_file.display(),
            args.episodes
        );
        let summary = evaluate(
            &mut environment,
            policy.as_mut(),
            args.episodes,
            args.max_steps,
        )?;
        println!("{}", summary);
        println!(
            "success rate {:.2}, mean steps {:.1}, items moved {}",
            summary.success_rate(),
            summary.mean_steps(),
            environment.delivered_item_count()
        );
        return Ok(());
    }

    // Create the application state before touching the terminal so errors print normally
    let mut app = App::new(environment, policy, args.max_steps)?;

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run the main application loop
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));

    // Restore the terminal state
    restore_terminal(&mut terminal)?;

    result
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?; // Put terminal in raw mode
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?; // Use alternate screen and enable mouse capture
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into) // Map io::Error to anyhow::Error
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        // Draw the UI
        terminal.draw(|f| ui(f, app))?;

        // Calculate timeout for event polling
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        // Poll for events (keyboard, mouse, etc.)
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char(' ') => app.toggle_pause(),
                    KeyCode::Char('r') => app.next_episode()?,
                    _ => {}
                }
            }
        }

        // Update application state if enough time has passed
        if last_tick.elapsed() >= tick_rate {
            app.tick()?; // Perform simulation step
            last_tick = Instant::now();
        }

        // Exit loop if requested
        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(55), // Area for the floor
            Constraint::Percentage(35), // Area for station contents
            Constraint::Percentage(10), // Area for status/help
        ])
        .split(frame.area());

    let env = &app.environment;
    let view = env.view();

    render_floor(frame, main_layout[0], &view, env.height(), env.width());
    render_stations(frame, main_layout[1], &view);
    render_status(frame, main_layout[2], app);
}

/// Renders the warehouse floor onto the frame, two characters per cell.
fn render_floor(frame: &mut Frame, area: Rect, view: &WarehouseView<'_>, height: usize, width: usize) {
    let mut lines: Vec<Line> = Vec::with_capacity(height);

    for row in 0..height {
        let mut spans: Vec<Span> = Vec::with_capacity(width);
        for col in 0..width {
            spans.push(floor_span(view, Position::new(row, col)));
        }
        lines.push(Line::from(spans));
    }

    let title = match view.transaction {
        Some(transaction) => format!("Warehouse: {}", transaction),
        None => "Warehouse".to_string(),
    };
    let floor_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(floor_paragraph, area);
}

fn floor_span(view: &WarehouseView<'_>, position: Position) -> Span<'static> {
    if view.agent.position() == position {
        return match view.agent.carried_item() {
            Some(item) => Span::styled(
                format!("@{:<1}", item.slot()),
                Style::default().fg(Color::Red).bold(),
            ),
            None => Span::styled("@ ", Style::default().fg(Color::Red).bold()),
        };
    }
    if let Some((index, _)) = view
        .bins
        .iter()
        .enumerate()
        .find(|(_, bin)| bin.position() == position)
    {
        return Span::styled(format!("B{:<1}", index), Style::default().fg(Color::Yellow));
    }
    if view.staging_in.position() == position {
        return Span::styled("I ", Style::default().fg(Color::Green).bold());
    }
    if view.staging_out.position() == position {
        return Span::styled("O ", Style::default().fg(Color::Magenta).bold());
    }
    let serves_station = view.bins.iter().any(|bin| bin.is_loading_position(position))
        || view.staging_in.is_loading_position(position)
        || view.staging_out.is_loading_position(position);
    if serves_station {
        Span::styled("· ", Style::default().fg(Color::DarkGray))
    } else {
        Span::raw("  ")
    }
}

/// Renders the contents of every station and the agent's hand.
fn render_stations(frame: &mut Frame, area: Rect, view: &WarehouseView<'_>) {
    let mut station_items: Vec<ListItem> = view
        .bins
        .iter()
        .enumerate()
        .map(|(index, bin)| {
            // Items that already earned their first-removal bonus are dimmed
            let mut spans = vec![Span::raw(format!("B{} {} [", index, bin.position()))];
            for item in bin.items() {
                let style = if item.first_remove_from_bin_rewarded() {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Style::default().fg(Color::Yellow)
                };
                spans.push(Span::styled(format!(" {}", item.slot()), style));
            }
            spans.push(Span::raw(" ]"));
            ListItem::from(Line::from(spans))
        })
        .collect();

    station_items.push(ListItem::from(Line::from(Span::styled(
        view.staging_in.to_string(),
        Style::default().fg(Color::Green),
    ))));
    station_items.push(ListItem::from(Line::from(Span::styled(
        view.staging_out.to_string(),
        Style::default().fg(Color::Magenta),
    ))));
    station_items.push(ListItem::from(Line::from(Span::styled(
        view.agent.to_string(),
        Style::default().fg(Color::Red),
    ))));

    let station_widget =
        List::new(station_items).block(Block::default().borders(Borders::ALL).title("Stations"));
    frame.render_widget(station_widget, area);
}

/// Renders episode counters and key help.
fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let env = &app.environment;
    let last = match app.last_action {
        Some((action, reward)) => format!("{} ({:+.1})", action, reward),
        None => "-".to_string(),
    };
    let state = if app.paused { " [paused]" } else { "" };
    let status = format!(
        "Episode {} ({} succeeded) | step {}/{} | last {} | invalid {} | items moved {}{}",
        app.episode,
        app.succeeded,
        app.episode_steps,
        app.max_steps,
        last,
        env.invalid_action_count(),
        env.delivered_item_count(),
        state
    );
    let help_text = Paragraph::new(vec![
        Line::from(status),
        Line::from("Press 'q' or 'Esc' to quit, space to pause, 'r' to re-roll."),
    ])
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, area);
}
