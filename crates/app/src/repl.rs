use std::collections::BTreeMap;
use std::sync::Arc;

use quiz_core::model::QuestionSequence;
use quiz_core::{NavigationEvent, TransitionReason};
use services::{
    GradeOutcome, PracticeError, PracticeService, PracticeSession, SessionContext, SubmitResult,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, PartialEq)]
enum Input {
    Next,
    Previous,
    Goto(usize),
    Open,
    Submit(BTreeMap<String, String>),
    Check { name: String, value: String },
    Mark { passed: bool, score: Option<f64> },
    Feedback,
    Status,
    Help,
    Quit,
}

fn parse_input(line: &str) -> Result<Input, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(Input::Status);
    };
    let rest: Vec<&str> = words.collect();

    match head {
        "n" | "next" => Ok(Input::Next),
        "p" | "prev" | "previous" => Ok(Input::Previous),
        "g" | "goto" => {
            let raw = rest.first().ok_or("goto requires a question number")?;
            let number: usize = raw
                .parse()
                .map_err(|_| format!("invalid question number: {raw}"))?;
            number
                .checked_sub(1)
                .map(Input::Goto)
                .ok_or_else(|| "question numbers start at 1".to_string())
        }
        "o" | "open" => Ok(Input::Open),
        "s" | "submit" => {
            let mut answers = BTreeMap::new();
            for pair in rest {
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("expected name=value, got {pair}"))?;
                answers.insert(name.to_string(), value.to_string());
            }
            Ok(Input::Submit(answers))
        }
        "c" | "check" => {
            let pair = rest.first().ok_or("check requires name=value")?;
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected name=value, got {pair}"))?;
            Ok(Input::Check {
                name: name.to_string(),
                value: value.to_string(),
            })
        }
        "pass" | "fail" => {
            let score = match rest.first() {
                Some(raw) => Some(
                    raw.parse::<f64>()
                        .map_err(|_| format!("invalid score: {raw}"))?,
                ),
                None => None,
            };
            Ok(Input::Mark {
                passed: head == "pass",
                score,
            })
        }
        "f" | "feedback" => Ok(Input::Feedback),
        "status" => Ok(Input::Status),
        "h" | "help" | "?" => Ok(Input::Help),
        "q" | "quit" | "exit" => Ok(Input::Quit),
        other => Err(format!("unknown command: {other}")),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  next | prev | goto <n>        navigate");
    println!("  open                          load and render the current question");
    println!("  check name=value              validate one input with STACK");
    println!("  submit name=value ...         grade answers with STACK");
    println!("  pass [score] | fail [score]   record a self-graded result");
    println!("  feedback                      ask the AI tutor about the last submission");
    println!("  status | help | quit");
}

fn print_status(session: &PracticeSession) {
    let view = session.view();
    let mode = if view.adaptive { "  (adaptive)" } else { "" };
    let review = if view.next_adaptive { "  (review)" } else { "" };
    println!(
        "[{}] {}{mode}   attempted {}/{}  passed {}",
        view.position(),
        view.title,
        view.attempted,
        view.total,
        view.passed
    );
    println!("  {}    {}{review}", view.previous_label(), view.next_label());
}

fn print_event(event: &NavigationEvent) {
    let note = match event.reason {
        TransitionReason::Remediation => " (easier question on the same topic)",
        TransitionReason::Repeat => " (try this one again)",
        _ => "",
    };
    println!("→ {}{note}", event.title);
}

fn print_result(result: &SubmitResult) {
    let verdict = if result.outcome.passed {
        "correct"
    } else {
        "not yet correct"
    };
    println!(
        "Score {}/{} ({verdict})",
        result.outcome.score, result.outcome.max_score
    );
    if let Some(summary) = &result.outcome.response_summary {
        println!("  {summary}");
    }
    if result.all_attempted {
        println!("All questions attempted; navigation is unlocked.");
    }
}

pub async fn run(
    practice: Arc<PracticeService>,
    sequence: QuestionSequence,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = practice.start(sequence, SessionContext::default()).await?;
    print_help();
    print_status(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = match parse_input(&line) {
            Ok(input) => input,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        if input == Input::Quit {
            break;
        }
        if let Err(err) = handle(&practice, &mut session, input).await {
            println!("{err}");
        }
    }

    practice.finish(&mut session).await?;
    let view = session.view();
    println!("Done: {} of {} attempted, {} passed.", view.attempted, view.total, view.passed);
    Ok(())
}

async fn handle(
    practice: &PracticeService,
    session: &mut PracticeSession,
    input: Input,
) -> Result<(), PracticeError> {
    match input {
        Input::Next => match practice.forward(session)? {
            Some(event) => print_event(&event),
            None => println!("This is the last question."),
        },
        Input::Previous => match practice.backward(session)? {
            Some(event) => print_event(&event),
            None => println!("This is the first question."),
        },
        Input::Goto(index) => print_event(&practice.jump_to(session, index)?),
        Input::Open => {
            let current = practice.open_current(session).await?;
            match &current.render {
                Some(render) => println!("{}", render.html_with_inputs()),
                None => println!("{}", current.loaded.question_xml),
            }
        }
        Input::Submit(answers) => print_result(&practice.submit_answers(session, answers).await?),
        Input::Check { name, value } => {
            let validation = practice.validate_input(session, &name, &value).await?;
            println!("{}", validation.validation);
            return Ok(());
        }
        Input::Mark { passed, score } => {
            let score = score.unwrap_or(if passed { 1.0 } else { 0.0 });
            let outcome = GradeOutcome::manual(passed, score, 1.0);
            print_result(&practice.record_outcome(session, outcome, BTreeMap::new()).await?);
        }
        Input::Feedback => println!("{}", practice.feedback(session).await?),
        Input::Status => {}
        Input::Help => print_help(),
        Input::Quit => return Ok(()),
    }
    print_status(session);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_navigation() {
        assert_eq!(parse_input("next"), Ok(Input::Next));
        assert_eq!(parse_input("  p "), Ok(Input::Previous));
        assert_eq!(parse_input("goto 3"), Ok(Input::Goto(2)));
        assert!(parse_input("goto 0").is_err());
        assert!(parse_input("goto x").is_err());
        assert_eq!(parse_input(""), Ok(Input::Status));
    }

    #[test]
    fn parses_results_and_answers() {
        assert_eq!(
            parse_input("fail 0.5"),
            Ok(Input::Mark {
                passed: false,
                score: Some(0.5)
            })
        );
        assert_eq!(
            parse_input("pass"),
            Ok(Input::Mark {
                passed: true,
                score: None
            })
        );
        let Ok(Input::Submit(answers)) = parse_input("submit ans1=x^2 ans2=[1,2]") else {
            panic!("expected submit");
        };
        assert_eq!(answers.get("ans2").map(String::as_str), Some("[1,2]"));
        assert!(parse_input("submit ans1").is_err());
        assert_eq!(
            parse_input("check ans1=x+1"),
            Ok(Input::Check {
                name: "ans1".into(),
                value: "x+1".into()
            })
        );
        assert!(parse_input("check").is_err());
        assert!(parse_input("dance").is_err());
    }
}
