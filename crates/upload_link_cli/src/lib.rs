//! Command-line client for GraphQL operations with file uploads.
//!
//! # Usage
//!
//! ```bash
//! # Send a query
//! upload-link send http://localhost:4000/api --query '{ me { id } }'
//!
//! # Upload a file into $file
//! upload-link send http://localhost:4000/api \
//!     --query-file upload.graphql \
//!     --file variables.file=./avatar.png
//!
//! # Print the encoded request without sending it
//! upload-link inspect --query-file upload.graphql --file variables.file=./avatar.png
//! ```

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;
use upload_link::{
    ContextData, FilePath, Headers, LinkError, Operation, PathSegment, RequestBody, ReqwestFetch,
    UploadFile, UploadLink, UploadValue,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(name = "upload-link")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send an operation and print the result
    Send(RequestArgs),

    /// Print the encoded request without sending it
    Inspect(RequestArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// GraphQL endpoint
    #[arg(env = "UPLOAD_LINK_ENDPOINT", default_value = upload_link::DEFAULT_URI)]
    pub endpoint: String,

    /// Query text
    #[arg(long, conflicts_with = "query_file")]
    pub query: Option<String>,

    /// File containing the query text
    #[arg(long)]
    pub query_file: Option<PathBuf>,

    /// Variables as a JSON object
    #[arg(long)]
    pub variables: Option<String>,

    /// Operation name
    #[arg(long)]
    pub operation_name: Option<String>,

    /// Extensions as a JSON object
    #[arg(long)]
    pub extensions: Option<String>,

    /// Send the operation's extensions
    #[arg(long)]
    pub include_extensions: bool,

    /// Request header, as `name:value` (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// File to upload, as `variables.path=./local/file` (repeatable)
    #[arg(short, long = "file", value_parser = parse_file_arg)]
    pub files: Vec<(FilePath, PathBuf)>,

    /// Credentials mode passed to the transport
    #[arg(long)]
    pub credentials: Option<String>,
}

/// Parses `name:value`.
pub fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected `name:value`, got `{s}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in `{s}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parses `variables.path=./local/file`.
pub fn parse_file_arg(s: &str) -> Result<(FilePath, PathBuf), String> {
    let (path, local) = s
        .split_once('=')
        .ok_or_else(|| format!("expected `variables.path=file`, got `{s}`"))?;
    let path: FilePath = path.parse().map_err(|e| format!("{e}"))?;
    match path.segments().first() {
        Some(PathSegment::Field(root)) if root == "variables" && path.segments().len() > 1 => {}
        _ => return Err(format!("file path must start with `variables.`, got `{path}`")),
    }
    if local.is_empty() {
        return Err(format!("missing local file in `{s}`"));
    }
    Ok((path, PathBuf::from(local)))
}

impl RequestArgs {
    fn query_text(&self) -> CliResult<String> {
        match (&self.query, &self.query_file) {
            (Some(query), _) => Ok(query.clone()),
            (None, Some(file)) => Ok(std::fs::read_to_string(file)?),
            (None, None) => Err("one of --query or --query-file is required".into()),
        }
    }

    /// Builds the operation, reading uploaded files from disk.
    pub fn operation(&self) -> CliResult<Operation> {
        let mut body = UploadValue::object();
        let variables = match &self.variables {
            Some(json) => {
                let value: serde_json::Value = serde_json::from_str(json)?;
                if !value.is_object() {
                    return Err("--variables must be a JSON object".into());
                }
                UploadValue::from(value)
            }
            None => UploadValue::object(),
        };
        body.insert("variables", variables);

        for (path, local) in &self.files {
            let file = UploadFile::from_path(local)?;
            if !body.set_path(path.segments(), file.into()) {
                return Err(format!("cannot place a file at `{path}`").into());
            }
        }

        let variables = body
            .replace_path(&[PathSegment::from("variables")], UploadValue::Null)
            .unwrap_or_else(UploadValue::object);

        let mut operation = Operation::new(self.query_text()?).with_variables(variables);
        if let Some(name) = &self.operation_name {
            operation = operation.with_operation_name(name);
        }
        if let Some(json) = &self.extensions {
            let value: serde_json::Value = serde_json::from_str(json)?;
            let serde_json::Value::Object(map) = value else {
                return Err("--extensions must be a JSON object".into());
            };
            for (key, value) in map {
                operation = operation.with_extension(key, value);
            }
        }

        let mut context = ContextData::new();
        if let Some(credentials) = &self.credentials {
            context = context.with_credentials(credentials);
        }
        Ok(operation.with_context(context))
    }

    /// Builds the link.
    pub fn link(&self) -> UploadLink {
        let headers: Headers = self.headers.iter().cloned().collect();
        UploadLink::builder(ReqwestFetch::new())
            .uri(&self.endpoint)
            .headers(headers)
            .include_extensions(self.include_extensions)
            .build()
    }
}

pub async fn run(cli: Cli) -> CliResult<i32> {
    match cli.command {
        Commands::Send(args) => send(&args, cli.verbose, cli.quiet).await,
        Commands::Inspect(args) => inspect(&args),
    }
}

async fn send(args: &RequestArgs, verbose: bool, quiet: bool) -> CliResult<i32> {
    let operation = args.operation()?;
    let context = operation.context().clone();
    let link = args.link();
    debug!(endpoint = %args.endpoint, files = args.files.len(), "sending operation");

    if verbose {
        println!("{} {}", "Sending".blue(), args.endpoint);
    }

    let outcome = link.execute(operation).await;

    if verbose {
        if let Some(response) = context.response() {
            println!("{} {}", "Status".blue(), response.status);
        }
    }

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !quiet {
                eprintln!("{}", "Success".green().bold());
            }
            Ok(0)
        }
        Err(error) => match error.partial_result() {
            Some(partial) => {
                println!("{}", serde_json::to_string_pretty(partial)?);
                report(&error);
                Ok(2)
            }
            None => {
                report(&error);
                Ok(1)
            }
        },
    }
}

fn report(error: &LinkError) {
    eprintln!("{} {}", "Error:".red().bold(), error);
    if let Some(body) = &error.body_text {
        eprintln!("  {} {}", "body".dimmed(), body);
    }
}

fn inspect(args: &RequestArgs) -> CliResult<i32> {
    let operation = args.operation()?;
    let prepared = args.link().prepare(&operation)?;
    let request = &prepared.request;

    println!("{} {} {}", "Request".blue().bold(), request.method, prepared.uri);
    for (name, value) in &request.headers {
        println!("  {}: {}", name.dimmed(), value);
    }
    if let Some(credentials) = &request.credentials {
        println!("  {} {}", "credentials".dimmed(), credentials);
    }
    println!();

    match &request.body {
        RequestBody::Json(text) => {
            let value: serde_json::Value = serde_json::from_str(text)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        RequestBody::Multipart(form) => {
            println!("{} ({} fields)", "multipart/form-data".yellow(), form.len());
            print!("{form}");
        }
    }
    Ok(0)
}
