use color_eyre::Result;
use psm_core::api::{
    self as api, CommandContext, CommandGroup, CommandInfo, ExecutionOutcome, PrivacyAction,
    PrivacyRequest,
};
use tracing::debug;

use crate::cli::{CommandGroupCli, PsmCli, ServiceArgs};

pub fn dispatch_command(
    ctx: &CommandContext,
    cli: &PsmCli,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    match &cli.command {
        CommandGroupCli::Add(args) => privacy_call(ctx, cli, PrivacyAction::Add, args),
        CommandGroupCli::Enable(args) => privacy_call(ctx, cli, PrivacyAction::Enable, args),
        CommandGroupCli::Remove(args) => privacy_call(ctx, cli, PrivacyAction::Remove, args),
        CommandGroupCli::Disable(args) => privacy_call(ctx, cli, PrivacyAction::Disable, args),
        CommandGroupCli::Services => {
            let info = CommandInfo::new(CommandGroup::Services, "services");
            core_call(info, || api::list_services(ctx))
        }
    }
}

fn privacy_call(
    ctx: &CommandContext,
    cli: &PsmCli,
    action: PrivacyAction,
    args: &ServiceArgs,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    let request = PrivacyRequest {
        action,
        service: args.service.clone(),
        apps: args.apps.clone(),
        user: cli.target.user.clone(),
        template: cli.target.template,
        language: cli.target.language.clone(),
        force_root: cli.target.forceroot,
        admin: cli.target.admin,
    };
    debug!(?request, "dispatching");
    core_call(request.info(), || api::execute(ctx, &request))
}

fn core_call<F>(info: CommandInfo, action: F) -> Result<(CommandInfo, ExecutionOutcome)>
where
    F: FnOnce() -> anyhow::Result<ExecutionOutcome>,
{
    match action() {
        Ok(outcome) => Ok((info, outcome)),
        Err(err) => {
            let mut outcome = ExecutionOutcome::from_error(&err);
            let issues: Vec<String> = err.chain().map(ToString::to_string).collect();
            if let Some(details) = outcome.details.as_object_mut() {
                details.insert("issues".into(), serde_json::json!(issues));
                details.insert(
                    "hint".into(),
                    serde_json::json!("Re-run with `-v` or `--trace` for more detail."),
                );
            }
            Ok((info, outcome))
        }
    }
}
