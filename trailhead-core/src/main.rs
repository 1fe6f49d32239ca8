use trailhead::{init_app_state, logging, serve, DataDir};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let data_dir = DataDir::default();
  let state = init_app_state(data_dir).await?;
  logging::init(&state.config().log_level);

  serve(state).await?;
  return Ok(());
}
