#[tokio::main]
async fn main() {
    restho::start_server().await;
}
