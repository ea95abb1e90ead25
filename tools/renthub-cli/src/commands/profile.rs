//! Profile commands.

use anyhow::Result;
use renthub_market::profile::ProfileParams;
use renthub_market::UserId;

use super::{ProfileArgs, ProfileCommand};
use crate::context::Context;

/// Run the profile command.
pub async fn run(args: ProfileArgs, ctx: &Context) -> Result<()> {
    let session = ctx.open()?;

    match args.command {
        ProfileCommand::Show {
            user,
            nickname,
            email,
        } => {
            let info = session
                .market
                .profile_or_default(&UserId::new(user), &nickname, &email)?;

            if ctx.output.is_json() {
                ctx.output.json(&info);
                return Ok(());
            }
            ctx.output.header(&format!("Profile {}", info.id));
            ctx.output.kv("nickname", &info.nickname);
            ctx.output.kv("email", &info.email);
            ctx.output.kv("phone", info.phone_number.as_deref().unwrap_or("-"));
            ctx.output.kv("meet point", info.meet_point.as_deref().unwrap_or("-"));
        }
        ProfileCommand::Set {
            user,
            nickname,
            email,
            phone,
            meet_point,
        } => {
            let outcome = session.market.save_profile(
                &UserId::new(user),
                ProfileParams {
                    nickname,
                    email,
                    phone_number: phone,
                    meet_point,
                },
            )?;
            session.flush()?;

            if ctx.output.is_json() {
                ctx.output.json(&serde_json::json!({ "message": outcome.message() }));
                return Ok(());
            }
            ctx.output.success(outcome.message());
        }
    }
    Ok(())
}
