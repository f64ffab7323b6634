#[macro_use]
extern crate log;

use argh::FromArgs;

#[cfg(target_family = "unix")]
use smbc_context::{
    AuthData, AuthRequest, ClientContext, ContextFlags, ContextOptions, DirEntryType,
};

#[derive(FromArgs)]
#[argh(description = "
where positional is: smb://[workgroup;][user@]server[:port]/share[/path]

Lists the remote directory, descending into subdirectories up to --depth.
Credentials are asked on the terminal when the server requires them.")]
struct Args {
    #[argh(option, short = 'P', description = "specify password")]
    password: Option<String>,
    #[argh(option, short = 'u', description = "specify username")]
    username: Option<String>,
    #[argh(
        option,
        short = 'w',
        default = r#""WORKGROUP".to_string()"#,
        description = "specify workgroup"
    )]
    workgroup: String,
    #[argh(option, short = 'd', default = "1", description = "max depth")]
    depth: usize,
    #[argh(switch, description = "never fall back to anonymous login")]
    no_anonymous: bool,
    #[argh(positional, description = "smb uri of the directory to list")]
    uri: String,
}

#[cfg(target_family = "unix")]
fn main() -> anyhow::Result<()> {
    assert!(env_logger::builder().try_init().is_ok());
    let args: Args = argh::from_env();
    let context = init_context(&args)?;

    info!("listing files at {}", args.uri);
    tree(&context, args.uri.trim_end_matches('/'), 0, args.depth)?;

    info!("releasing context...");
    context.close();
    Ok(())
}

#[cfg(not(target_family = "unix"))]
fn main() {
    let _: Args = argh::from_env();
    eprintln!("this demo requires libsmbclient and runs on UNIX only");
}

#[cfg(target_family = "unix")]
fn init_context(args: &Args) -> anyhow::Result<ClientContext> {
    info!(
        "initializing context with workgroup {} and username {:?}",
        args.workgroup, args.username
    );
    let workgroup = args.workgroup.clone();
    let username = args.username.clone();
    let password = args.password.clone();
    let mut flags = ContextFlags::empty();
    if args.no_anonymous {
        flags |= ContextFlags::NO_AUTO_ANONYMOUS_LOGIN;
    }
    let context = ClientContext::new(
        ContextOptions::default()
            .flags(flags)
            .credential_resolver(move |req: &AuthRequest<'_>| {
                let username = match &username {
                    Some(u) => u.clone(),
                    None if !req.username.is_empty() => req.username.to_string(),
                    None => read_line_from_tty(&format!("Username for {}: ", req.server)).ok()?,
                };
                let password = match &password {
                    Some(p) => p.clone(),
                    None => read_secret_from_tty(&format!(
                        "Password for {}@{}/{}: ",
                        username, req.server, req.share
                    ))
                    .ok()?,
                };
                Some(AuthData::new(workgroup.clone(), username, password))
            }),
    )?;
    Ok(context)
}

#[cfg(target_family = "unix")]
fn tree(context: &ClientContext, uri: &str, level: usize, depth: usize) -> anyhow::Result<()> {
    for entry in context.open_dir(uri)? {
        let entry = entry?;
        if entry.name == "." || entry.name == ".." {
            continue;
        }
        let suffix = match entry.kind {
            DirEntryType::Dir => "/",
            kind if kind.is_share() => " (share)",
            _ => "",
        };
        println!("{}{}{}", "  ".repeat(level), entry.name, suffix);
        let descend = entry.is_dir() || entry.kind == DirEntryType::FileShare;
        if descend && level + 1 < depth {
            tree(context, &format!("{}/{}", uri, entry.name), level + 1, depth)?;
        }
    }
    Ok(())
}

#[cfg(target_family = "unix")]
/// Read a line from tty with customisable prompt
fn read_line_from_tty(prompt: &str) -> std::io::Result<String> {
    eprint!("{prompt}");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[cfg(target_family = "unix")]
/// Read a secret from tty with customisable prompt
fn read_secret_from_tty(prompt: &str) -> std::io::Result<String> {
    rpassword::prompt_password(prompt)
}
