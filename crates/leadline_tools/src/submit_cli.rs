#![forbid(unsafe_code)]

use leadline_os::lead_form::{reduce, LeadFormAction, LeadFormState};
use leadline_os::submission::{
    NoticeKind, SubmissionClient, SubmissionOutcome, SubmissionTransport,
};

pub const SUBMIT_USAGE: &str = "usage: leadline submit --first-name <v> --last-name <v> \
--phone <v> --email <v> [--intent <v>] [--language <v>] [--service-type <v>] [--urgency <v>] \
[--property-type <v>] [--address <v>] [--description <v>] [--call]";

/// Folds `--flag value` pairs into a form state through the form reducer.
pub fn parse_submit_args(args: &[String]) -> Result<LeadFormState, String> {
    let mut state = LeadFormState::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        if flag == "--call" {
            state = reduce(&state, LeadFormAction::SetOptInCall(true));
            continue;
        }
        let make: fn(String) -> LeadFormAction = match flag.as_str() {
            "--first-name" => LeadFormAction::SetFirstName,
            "--last-name" => LeadFormAction::SetLastName,
            "--phone" => LeadFormAction::SetPhoneNumber,
            "--email" => LeadFormAction::SetEmail,
            "--intent" => LeadFormAction::SetIntent,
            "--language" => LeadFormAction::SetLanguage,
            "--service-type" => LeadFormAction::SetServiceType,
            "--urgency" => LeadFormAction::SetUrgency,
            "--property-type" => LeadFormAction::SetPropertyType,
            "--address" => LeadFormAction::SetAddress,
            "--description" => LeadFormAction::SetProjectDescription,
            other => return Err(format!("unknown flag '{other}'\n{SUBMIT_USAGE}")),
        };
        let value = iter
            .next()
            .ok_or_else(|| format!("missing value for {flag}\n{SUBMIT_USAGE}"))?;
        state = reduce(&state, make(value.clone()));
    }
    Ok(state)
}

/// Submits once and renders the notice. Error notices come back as `Err`.
pub fn execute_submit_command<T>(
    client: &SubmissionClient<T>,
    state: &LeadFormState,
) -> Result<String, String>
where
    T: SubmissionTransport,
{
    let SubmissionOutcome {
        notice, lead_id, ..
    } = client.submit(state);
    match (notice.kind, lead_id) {
        (NoticeKind::Success, Some(lead_id)) => Ok(format!("{} (lead {lead_id})", notice.message)),
        (NoticeKind::Success, None) => Ok(notice.message),
        (NoticeKind::Error, _) => Err(notice.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadline_contracts::lead::SubmitLeadRequest;
    use leadline_os::submission::SubmissionTransportError;
    use serde_json::{json, Value};

    struct FixedReply(Result<Value, SubmissionTransportError>);

    impl SubmissionTransport for FixedReply {
        fn post_submit_lead(
            &self,
            _req: &SubmitLeadRequest,
        ) -> Result<Value, SubmissionTransportError> {
            self.0.clone()
        }
    }

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn flags_fill_the_form_over_defaults() {
        let state = parse_submit_args(&args(&[
            "--first-name",
            "Marie",
            "--last-name",
            "Curie",
            "--phone",
            "33123456",
            "--email",
            "marie@example.fr",
            "--language",
            "french",
            "--call",
        ]))
        .unwrap();
        assert_eq!(state.first_name, "Marie");
        assert_eq!(state.language, "french");
        assert_eq!(state.service_type, "electrical_repair");
        assert!(state.opt_in_call);
    }

    #[test]
    fn unknown_flag_and_missing_value_are_errors() {
        assert!(parse_submit_args(&args(&["--nope", "x"]))
            .unwrap_err()
            .starts_with("unknown flag '--nope'"));
        assert!(parse_submit_args(&args(&["--email"]))
            .unwrap_err()
            .starts_with("missing value for --email"));
    }

    #[test]
    fn success_and_failure_notices_are_rendered() {
        let state = parse_submit_args(&args(&[
            "--first-name",
            "Ann",
            "--last-name",
            "Lee",
            "--phone",
            "+15550001111",
            "--email",
            "ann@example.com",
        ]))
        .unwrap();
        let ok = SubmissionClient::new(FixedReply(Ok(json!({"success": true, "leadId": 3}))));
        assert_eq!(
            execute_submit_command(&ok, &state).unwrap(),
            "Thank you! We've received your request and will be in touch soon. (lead 3)"
        );
        let down = SubmissionClient::new(FixedReply(Err(SubmissionTransportError::Network(
            "connection refused".to_string(),
        ))));
        assert_eq!(
            execute_submit_command(&down, &state).unwrap_err(),
            "Network error. Please check your internet connection and try again."
        );
    }
}
