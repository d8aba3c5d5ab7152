//! Outbound message catalog
//!
//! Fixed SMS bodies and the spoken review-call script. The only
//! parameterized templates substitute the customer's name.

/// Static message bodies
const GREETING: &str = "Hello from Solara Resorts and Spas. Thank you for \
reaching out to our review rewards program, where you can leave a review \
over the phone and receive $50 of resort credit toward your next stay!";

const PARTICIPATION_INVITE: &str = "Would you like to leave a review today? (yes/no)";

const ACCEPT_CONFIRMATION: &str = "Thank you for choosing to participate. \
Your resort credit will be available in your account after leaving your review.";

const INVITE_FALLBACK: &str = "Sorry, I did not understand that. Please say \"yes\" or \"no\".";

const ASK_FOR_NAME: &str = "Please enter your name.";

const ASK_FOR_NAME_FALLBACK: &str = "Sorry, I did not catch that. Please enter your name.";

const CALL_NOTIFICATION: &str = "You will receive a call shortly to leave your review.";

const GOODBYE: &str = "Thank you for reaching out to us. Goodbye.";

const THANK_YOU: &str = "We have received your review. Thank you for participating!";

/// Spoken call script fragments
const CALL_GREETING_TWIML: &str = "\n\t<Say>Greetings from Solara Resorts and Spas.</Say>\n";

const CALL_INSTRUCTIONS_TWIML: &str = "\n\t<Say>Thank you for participating in our review \
rewards program, where you will receive 50 dollars of resort credit by leaving a review \
of your recent stay! You may leave a review up to 1 minute long. Please leave your \
review after the beep.</Say>\n";

const RECORD_VERB_TWIML: &str = "\n\t<Record timeout=\"10\" maxLength=\"60\" playBeep=\"true\"></Record>\n";

/// Identifier for every outbound message template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateId {
    Greeting,
    ParticipationInvite,
    AcceptConfirmation,
    InviteFallback,
    AskForName,
    AskForNameFallback,
    NamedGreeting,
    CallNotification,
    Goodbye,
    ThankYou,
}

/// Substitution values for parameterized templates
#[derive(Debug, Clone, Copy, Default)]
pub struct Substitutions<'a> {
    pub name: Option<&'a str>,
}

/// Render a template to its SMS body.
///
/// `NamedGreeting` requires a name; passing none is a programming error.
pub fn render(id: TemplateId, subs: Substitutions<'_>) -> String {
    match id {
        TemplateId::Greeting => match subs.name {
            Some(name) => format!("Hello, {}! {}", name, GREETING),
            None => GREETING.to_string(),
        },
        TemplateId::ParticipationInvite => PARTICIPATION_INVITE.to_string(),
        TemplateId::AcceptConfirmation => ACCEPT_CONFIRMATION.to_string(),
        TemplateId::InviteFallback => INVITE_FALLBACK.to_string(),
        TemplateId::AskForName => ASK_FOR_NAME.to_string(),
        TemplateId::AskForNameFallback => ASK_FOR_NAME_FALLBACK.to_string(),
        TemplateId::NamedGreeting => {
            let name = subs.name.expect("NamedGreeting requires a name substitution");
            format!("Hello, {}!", name)
        }
        TemplateId::CallNotification => CALL_NOTIFICATION.to_string(),
        TemplateId::Goodbye => GOODBYE.to_string(),
        TemplateId::ThankYou => THANK_YOU.to_string(),
    }
}

/// Assemble the spoken review-call script as inline TwiML.
pub fn review_call_twiml() -> String {
    let mut twiml = String::from("<Response>");
    twiml.push_str(CALL_GREETING_TWIML);
    twiml.push_str(CALL_INSTRUCTIONS_TWIML);
    twiml.push_str(RECORD_VERB_TWIML);
    twiml.push_str("</Response>");
    twiml
}
