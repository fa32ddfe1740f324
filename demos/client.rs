use argh::FromArgs;
use reqwest::multipart::{Form, Part};
use std::path::PathBuf;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8080;

#[derive(FromArgs)]
/// DigitalEye client for asking questions about images
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "ask" or "describe"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Ask(AskCommand),
    Describe(DescribeCommand),
}

#[derive(FromArgs)]
/// Ask a question about an image
#[argh(subcommand, name = "ask")]
struct AskCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// the question; the server's default question is used when omitted
    #[argh(option, short = 'q')]
    question: Option<String>,
}

#[derive(FromArgs)]
/// Describe an image with the server's caption prompt
#[argh(subcommand, name = "describe")]
struct DescribeCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

async fn image_part(path: &PathBuf) -> Result<Part, Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo.jpg".to_string());
    Ok(Part::bytes(bytes).file_name(file_name))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let (endpoint, form) = match args.command {
        ClientCommands::Ask(ask) => {
            let mut form = Form::new().part("image", image_part(&ask.image_path).await?);
            if let Some(question) = ask.question {
                form = form.text("text", question);
            }
            ("send_check", form)
        }
        ClientCommands::Describe(describe) => {
            let form = Form::new().part("image", image_part(&describe.image_path).await?);
            ("send_per_check", form)
        }
    };

    let response = client
        .post(format!("http://{}/{}", addr, endpoint))
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    let result = response.json::<serde_json::Value>().await?;
    println!("Status: {}", status);
    println!("Result: {}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
