use crate::infra::{build_engine, seed_users, Engine};
use casework::config::EngineConfig;
use casework::error::AppError;
use casework::workflows::case_study::{
    Actor, ArtifactSlot, CaseStudyRequest, CorrectionArtifacts, LegalArea, NewCaseStudyRequest,
    Role, UploadedFile, UserId, VacationWindow,
};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Calendar date the vacation part of the demo starts on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Grade the instructor awards on the 0-18 scale.
    #[arg(long, default_value_t = 11.0)]
    pub(crate) grade: f64,
    /// Skip the vacation handover portion of the demo.
    #[arg(long)]
    pub(crate) skip_vacation: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        grade,
        skip_vacation,
    } = args;
    let today = today.unwrap_or_else(|| Local::now().date_naive());

    let engine = build_engine(EngineConfig::default(), seed_users());
    println!("Case study lifecycle demo");

    walk_lifecycle(&engine, grade)?;
    if !skip_vacation {
        walk_vacation_handover(&engine, today)?;
    }

    let notifications = engine.notifications.sent();
    println!("\nNotifications dispatched: {}", notifications.len());
    for notification in notifications {
        println!(
            "  - {} -> {}: {}",
            notification.title, notification.user_id, notification.message
        );
    }
    Ok(())
}

fn walk_lifecycle(engine: &Engine, grade: f64) -> Result<(), AppError> {
    let service = &engine.service;
    let student = Actor::new("stu-lena", Role::Student);

    let request = service.create_request(
        &student,
        NewCaseStudyRequest {
            student_id: student.id.clone(),
            legal_area: LegalArea::CivilLaw,
            sub_area: Some("Schuldrecht AT".to_string()),
            focus_area: Some("Leistungsstörungen".to_string()),
            federal_state: None,
            random_assignment: false,
        },
    )?;
    print_step("Requested", &request);

    let Some(assignee) = request.assigned_instructor_id.clone() else {
        println!("  no instructor available for {}", request.legal_area.label());
        return Ok(());
    };
    let instructor = Actor::new(assignee.0.as_str(), Role::Instructor);
    let id = request.id.clone();

    let record = service.upload_file(
        &instructor,
        &id,
        ArtifactSlot::CaseMaterial,
        pdf("sachverhalt.pdf"),
    )?;
    print_step("Case material uploaded", &record);

    let record = service.upload_file(
        &student,
        &id,
        ArtifactSlot::Submission,
        pdf("bearbeitung.pdf"),
    )?;
    print_step("Solution submitted", &record);

    let record = service.download_submission(&instructor, &id)?;
    print_step("Submission downloaded", &record);

    let written = service.upload_file(
        &instructor,
        &id,
        ArtifactSlot::WrittenCorrection,
        pdf("korrektur.pdf"),
    )?;
    print_step("Written correction uploaded", &written);
    let record = service.upload_correction(
        &instructor,
        &id,
        CorrectionArtifacts {
            video_url: Some("https://vimeo.com/demo-korrektur".to_string()),
            ..CorrectionArtifacts::default()
        },
    )?;
    print_step("Video correction linked", &record);

    let saved = service.save_grade(&instructor, &id, Some(grade), None)?;
    println!(
        "- Grade saved: {} points ({})",
        grade,
        saved.description.as_deref().unwrap_or("-")
    );

    service.mark_correction_viewed(&student, &id)?;
    service.mark_video_viewed(&student, &id)?;
    let rating = service.rate(&student, &id, 5, Some("Sehr hilfreiche Korrektur".to_string()))?;
    println!("- Student rated the correction with {} stars", rating.stars);

    let overview = service.student_overview(&student, &student.id)?;
    println!(
        "- Overview for {}: {} total | {} open | {} done | {} credits left",
        overview.student_id,
        overview.total_requests,
        overview.open_requests,
        overview.completed_requests,
        overview.credit_balance
    );
    if let Some(average) = overview.average_grade {
        println!("  average grade {average:.1}");
    }
    Ok(())
}

fn walk_vacation_handover(engine: &Engine, today: NaiveDate) -> Result<(), AppError> {
    let service = &engine.service;
    let student = Actor::new("stu-jonas", Role::Student);
    let admin = Actor::new("adm-office", Role::Admin);
    let instructor = UserId("ins-becker".to_string());

    println!("\nVacation handover");
    let request = service.create_request(
        &student,
        NewCaseStudyRequest {
            student_id: student.id.clone(),
            legal_area: LegalArea::CriminalLaw,
            sub_area: Some("Strafrecht BT".to_string()),
            focus_area: Some("Vermögensdelikte".to_string()),
            federal_state: None,
            random_assignment: false,
        },
    )?;
    print_step("Requested", &request);

    let window = VacationWindow {
        start: today,
        end: today + Duration::days(7),
    };
    let moved = service.toggle_vacation(&admin, &instructor, false, Some(window))?;
    println!(
        "- {} away {} to {}: {} request(s) handed over",
        instructor,
        window.start,
        window.end,
        moved.len()
    );
    for outcome in &moved {
        println!(
            "  {} {} -> {}",
            outcome.request.reference(),
            outcome.from,
            outcome.to
        );
    }

    let returned_on = window.end + Duration::days(1);
    let toggled = service.apply_vacation_calendar(&admin, returned_on)?;
    for (user, on_duty) in toggled {
        println!(
            "- Calendar on {returned_on}: {user} {}",
            if on_duty { "back on duty" } else { "away" }
        );
    }

    let record = service.get(&admin, &request.id)?;
    print_step("After return", &record);
    Ok(())
}

fn pdf(file_name: &str) -> UploadedFile {
    UploadedFile {
        file_name: file_name.to_string(),
        content_type: "application/pdf".to_string(),
        bytes: format!("%PDF-1.7 {file_name}").into_bytes(),
    }
}

fn print_step(step: &str, record: &CaseStudyRequest) {
    println!(
        "- {step}: {} [{}] assigned to {}",
        record.reference(),
        record.status.label(),
        record
            .assigned_instructor_id
            .as_ref()
            .map_or_else(|| "nobody".to_string(), ToString::to_string)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use casework::workflows::case_study::NotificationKind;

    #[test]
    fn demo_walks_both_scenarios() {
        let engine = build_engine(EngineConfig::default(), seed_users());
        let today = NaiveDate::from_ymd_opt(2025, 7, 1).expect("valid date");

        walk_lifecycle(&engine, 11.0).expect("lifecycle walk");
        walk_vacation_handover(&engine, today).expect("vacation walk");

        let admin = Actor::new("adm-office", Role::Admin);
        let lena = engine
            .service
            .student_overview(&admin, &UserId("stu-lena".to_string()))
            .expect("overview");
        assert_eq!(lena.completed_requests, 1);
        assert_eq!(lena.average_grade, Some(11.0));

        let jonas = engine
            .service
            .student_overview(&admin, &UserId("stu-jonas".to_string()))
            .expect("overview");
        assert_eq!(jonas.open_requests, 1);

        let kinds: Vec<_> = engine
            .notifications
            .sent()
            .into_iter()
            .map(|notification| notification.kind)
            .collect();
        assert!(kinds.contains(&NotificationKind::CorrectionAvailable));
        assert_eq!(
            kinds
                .iter()
                .filter(|kind| **kind == NotificationKind::Reassigned)
                .count(),
            2
        );
        assert_eq!(engine.blobs.len(), 3);
    }
}
