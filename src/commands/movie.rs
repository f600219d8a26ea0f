use clap::{Args, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc;

use moviestore::{DataStatus, Movie, MovieStore};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct MovieCommand {
    #[command(subcommand)]
    pub command: MovieSubcommand,
}

#[derive(Subcommand)]
pub enum MovieSubcommand {
    /// Add a new movie
    Add {
        /// Title of the movie
        title: String,

        /// Genre
        #[arg(long)]
        genre: String,

        /// Release year
        #[arg(long)]
        year: i32,

        /// Add even if a movie with this title exists
        #[arg(long)]
        allow_duplicate: bool,
    },

    /// List all movies
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a movie's details
    Show {
        /// Movie ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing movie
    Update {
        /// Movie ID
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New genre
        #[arg(long)]
        genre: Option<String>,

        /// New release year
        #[arg(long)]
        year: Option<i32>,
    },

    /// Delete a movie
    Delete {
        /// Movie ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Check whether a movie with this exact title exists
    Exists {
        /// Title to look for
        title: String,
    },

    /// Print the collection every time it changes (Ctrl-C to stop)
    Watch,
}

/// Notification forwarded from the store's listener
enum StatusEvent {
    Updated,
    Error(String),
}

struct ChannelObserver {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelObserver {
    fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl DataStatus for ChannelObserver {
    fn on_data_updated(&self) {
        let _ = self.tx.send(StatusEvent::Updated);
    }

    fn on_error(&self, message: &str) {
        let _ = self.tx.send(StatusEvent::Error(message.to_string()));
    }
}

impl MovieCommand {
    pub async fn run(&self, store: &MovieStore) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            MovieSubcommand::Add {
                title,
                genre,
                year,
                allow_duplicate,
            } => {
                let movie = add_new_movie(store, title, genre, *year, *allow_duplicate).await?;
                println!("Added movie:");
                println!("{}", movie);
                Ok(())
            }

            MovieSubcommand::List { format } => {
                let (observer, mut events) = ChannelObserver::channel();
                store.listen_for_updates(observer).await;

                match events.recv().await {
                    Some(StatusEvent::Updated) => {}
                    Some(StatusEvent::Error(message)) => return Err(message.into()),
                    None => return Err("Listener stopped before delivering movies".into()),
                }

                let movies = store.get_movies();
                let movies = movies.read().await;

                if movies.is_empty() {
                    println!("No movies found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&*movies)?);
                    }
                    OutputFormat::Text => print_table(&movies),
                }
                Ok(())
            }

            MovieSubcommand::Show { id, format } => match store.get_movie(id).await? {
                Some(movie) => {
                    match format {
                        OutputFormat::Json => {
                            println!("{}", serde_json::to_string_pretty(&movie)?);
                        }
                        OutputFormat::Text => {
                            println!("{}", movie);
                        }
                    }
                    Ok(())
                }
                None => Err(format!("Movie not found: {}", id).into()),
            },

            MovieSubcommand::Update {
                id,
                title,
                genre,
                year,
            } => {
                if title.is_none() && genre.is_none() && year.is_none() {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                let mut movie = match store.get_movie(id).await? {
                    Some(m) => m,
                    None => return Err(format!("Movie not found: {}", id).into()),
                };

                let title = title.clone().unwrap_or_else(|| movie.title.clone());
                let genre = genre.clone().unwrap_or_else(|| movie.genre.clone());
                let year = (*year).unwrap_or(movie.year);

                store.update_movie(&mut movie, title, genre, year)?;
                store.flush().await?;

                println!("Updated movie:");
                println!("{}", movie);
                Ok(())
            }

            MovieSubcommand::Delete { id, force } => {
                let movie = match store.get_movie(id).await? {
                    Some(m) => m,
                    None => return Err(format!("Movie not found: {}", id).into()),
                };

                // Confirm deletion unless --force is used
                if !force {
                    print!("Delete movie '{}'? [y/N] ", movie.title);
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                store.delete_movie(&movie);
                store.flush().await?;
                println!("Deleted movie: {}", movie.title);
                Ok(())
            }

            MovieSubcommand::Exists { title } => {
                if store.movie_exists(title).await {
                    println!("yes");
                } else {
                    println!("no");
                }
                Ok(())
            }

            MovieSubcommand::Watch => {
                let (observer, mut events) = ChannelObserver::channel();
                store.listen_for_updates(observer).await;
                let movies = store.get_movies();

                loop {
                    tokio::select! {
                        event = events.recv() => match event {
                            Some(StatusEvent::Updated) => {
                                let movies = movies.read().await;
                                println!("{} movie(s)", movies.len());
                                print_table(&movies);
                                println!();
                            }
                            Some(StatusEvent::Error(message)) => {
                                eprintln!("Error: {}", message);
                            }
                            None => break,
                        },
                        _ = tokio::signal::ctrl_c() => break,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Adds a movie, refusing a duplicate title unless allowed, and waits for
/// the write to land.
async fn add_new_movie(
    store: &MovieStore,
    title: &str,
    genre: &str,
    year: i32,
    allow_duplicate: bool,
) -> Result<Movie, Box<dyn std::error::Error>> {
    let title = title.trim();
    if !allow_duplicate && store.movie_exists(title).await {
        return Err(format!(
            "A movie titled '{}' already exists. Use --allow-duplicate to add it anyway.",
            title
        )
        .into());
    }

    let mut movie = Movie::new(title, genre.trim(), year);
    store.add_movie(&mut movie)?;
    store.flush().await?;
    Ok(movie)
}

fn print_table(movies: &[Movie]) {
    println!("{:<20}  {:<30}  {:<15}  YEAR", "ID", "TITLE", "GENRE");
    println!("{}", "-".repeat(75));
    for movie in movies {
        println!(
            "{:<20}  {:<30}  {:<15}  {}",
            movie.id,
            truncate(&movie.title, 30),
            truncate(&movie.genre, 15),
            movie.year
        );
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let kept: String = value.chars().take(width - 3).collect();
        format!("{}...", kept)
    } else {
        value.to_string()
    }
}
