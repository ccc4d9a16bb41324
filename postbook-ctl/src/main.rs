use anyhow::Context;
use postbook_api::{
    AuthToken, Comment, Error, Like, NewComment, NewPost, NewSession, NewUser, Post, PostList,
    ProfileUpdate, Removed, SinglePost, User, Uuid,
};
use serde::{de::DeserializeOwned, Serialize};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, env = "POSTBOOK_HOST", default_value = "http://localhost:3000")]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create an account and print its first session token
    Register {
        name: String,
        email: String,
        password: String,

        #[structopt(long, default_value = "")]
        avatar: String,
    },

    /// Open a session and print its token
    Login {
        email: String,
        password: String,

        #[structopt(long, default_value = "postbook-ctl")]
        device: String,
    },

    /// Close the current session
    Logout,

    /// Show the current user
    Whoami,

    /// Show a user's profile, or the current user's if none is given
    Profile { user: Option<String> },

    /// Change the current user's display name or avatar
    SetProfile {
        #[structopt(long)]
        name: Option<String>,

        #[structopt(long)]
        avatar: Option<String>,
    },

    /// Publish a new post
    Post { text: String },

    /// List all posts, newest first
    List,

    Show { post: String },

    Delete { post: String },

    Like { post: String },

    Unlike { post: String },

    /// Comment on a post
    Comment { post: String, text: String },

    /// Remove one of your comments
    Uncomment { post: String, comment: String },
}

fn token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("POSTBOOK_TOKEN").context("retrieving POSTBOOK_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing POSTBOOK_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

async fn send(req: reqwest::RequestBuilder) -> anyhow::Result<reqwest::Response> {
    let res = req.send().await.context("sending request")?;
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.bytes().await.context("reading error body")?;
    let err = Error::parse(&body)
        .with_context(|| format!("server answered {status} with an unparseable body"))?;
    Err(anyhow::Error::new(err).context(format!("server answered {status}")))
}

async fn send_json<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> anyhow::Result<T> {
    send(req)
        .await?
        .json()
        .await
        .context("parsing response body")
}

fn print<T: Serialize>(v: &T) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(v).context("serializing response")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = reqwest::Client::new();
    let url = |path: &str| format!("{}{}", opt.host, path);

    match opt.cmd {
        Command::Register {
            name,
            email,
            password,
            avatar,
        } => {
            let tok: AuthToken = send_json(client.post(url("/users")).json(&NewUser {
                name,
                email,
                password,
                avatar,
            }))
            .await?;
            println!("{}", tok.0);
        }
        Command::Login {
            email,
            password,
            device,
        } => {
            let tok: AuthToken = send_json(client.post(url("/auth")).json(&NewSession {
                email,
                password,
                device,
            }))
            .await?;
            println!("{}", tok.0);
        }
        Command::Logout => {
            send(client.post(url("/unauth")).bearer_auth(token()?.0)).await?;
        }
        Command::Whoami => {
            let u: User = send_json(client.get(url("/auth")).bearer_auth(token()?.0)).await?;
            print(&u)?;
        }
        Command::Profile { user } => {
            let path = match user {
                Some(user) => format!("/profile/user/{user}"),
                None => String::from("/profile/me"),
            };
            let u: User = send_json(client.get(url(&path)).bearer_auth(token()?.0)).await?;
            print(&u)?;
        }
        Command::SetProfile { name, avatar } => {
            let u: User = send_json(
                client
                    .put(url("/profile"))
                    .bearer_auth(token()?.0)
                    .json(&ProfileUpdate { name, avatar }),
            )
            .await?;
            print(&u)?;
        }
        Command::Post { text } => {
            let p: Post = send_json(
                client
                    .post(url("/posts"))
                    .bearer_auth(token()?.0)
                    .json(&NewPost { text }),
            )
            .await?;
            print(&p)?;
        }
        Command::List => {
            let l: PostList = send_json(client.get(url("/posts")).bearer_auth(token()?.0)).await?;
            print(&l)?;
        }
        Command::Show { post } => {
            let p: SinglePost = send_json(
                client
                    .get(url(&format!("/posts/{post}")))
                    .bearer_auth(token()?.0),
            )
            .await?;
            print(&p)?;
        }
        Command::Delete { post } => {
            let r: Removed = send_json(
                client
                    .delete(url(&format!("/posts/{post}")))
                    .bearer_auth(token()?.0),
            )
            .await?;
            println!("{}", r.msg);
        }
        Command::Like { post } => {
            let l: Vec<Like> = send_json(
                client
                    .put(url(&format!("/posts/like/{post}")))
                    .bearer_auth(token()?.0),
            )
            .await?;
            print(&l)?;
        }
        Command::Unlike { post } => {
            let l: Vec<Like> = send_json(
                client
                    .put(url(&format!("/posts/unlike/{post}")))
                    .bearer_auth(token()?.0),
            )
            .await?;
            print(&l)?;
        }
        Command::Comment { post, text } => {
            let c: Vec<Comment> = send_json(
                client
                    .post(url(&format!("/posts/comment/{post}")))
                    .bearer_auth(token()?.0)
                    .json(&NewComment { text }),
            )
            .await?;
            print(&c)?;
        }
        Command::Uncomment { post, comment } => {
            let c: Vec<Comment> = send_json(
                client
                    .delete(url(&format!("/posts/comment/{post}/{comment}")))
                    .bearer_auth(token()?.0),
            )
            .await?;
            print(&c)?;
        }
    }

    Ok(())
}
