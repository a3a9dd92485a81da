use crate::infra::{connect, load_attachment, parse_attachment};
use background_intake::config::AppConfig;
use background_intake::error::AppError;
use background_intake::intake::staging::format_file_size;
use background_intake::intake::{
    DocumentCategory, FieldUpdate, PaymentField, PersonalField, StagedFile, SubmissionGateway,
    WizardController, WizardError, WizardOptions, WizardStep,
};
use bytes::Bytes;
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

const SAMPLE_PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\ntrailer << /Root 1 0 R >>\n%%EOF\n";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Attach a file as CATEGORY=PATH (goodConduct, driversLicense, logBook, insurance).
    /// Categories without an attachment get a generated sample PDF.
    #[arg(long = "attach", value_parser = parse_attachment)]
    pub(crate) attachments: Vec<(DocumentCategory, PathBuf)>,
    /// Leave consent unticked to show the consent gate.
    #[arg(long)]
    pub(crate) skip_consent: bool,
}

pub(crate) async fn run_demo(config: &AppConfig, args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        attachments,
        skip_consent,
    } = args;

    let stack = connect(&config.storage).await?;
    let gateway = SubmissionGateway::new(stack.objects.clone(), stack.records.clone())
        .with_table(config.storage.submissions_table.clone());
    let controller = WizardController::new(
        stack.progress.clone(),
        gateway,
        WizardOptions {
            save_debounce: config.wizard.save_debounce,
            ..WizardOptions::default()
        },
    );

    println!("Background check intake demo");
    if let Some(saved_at) = controller.restored_at() {
        println!(
            "- Progress restored from {} (resuming at {})",
            saved_at.to_rfc3339(),
            controller.step()
        );
    }

    for field in [
        PersonalField::FirstName("Jane".to_string()),
        PersonalField::SecondName("Wanjiru".to_string()),
        PersonalField::Phone("+254 712 345 678".to_string()),
        PersonalField::Email("jane@x.com".to_string()),
        PersonalField::IdNumber("12345678".to_string()),
        PersonalField::Country("Kenya".to_string()),
        PersonalField::County("Nairobi".to_string()),
        PersonalField::PhysicalAddress("14 Riverside Drive, Westlands".to_string()),
    ] {
        controller.update(FieldUpdate::Personal(field))?;
    }

    let mut chosen: BTreeMap<DocumentCategory, Vec<StagedFile>> = BTreeMap::new();
    for (category, path) in &attachments {
        let file = load_attachment(path).await?;
        chosen.entry(*category).or_default().push(file);
    }

    println!("\nDocuments");
    for category in DocumentCategory::ALL {
        // Restored entries only carry metadata, so start each category afresh.
        controller.update(FieldUpdate::ClearDocuments(category))?;
        let files = chosen.remove(&category).unwrap_or_else(|| {
            vec![StagedFile::new(
                format!("{} sample.pdf", category.key()),
                "application/pdf",
                Bytes::from_static(SAMPLE_PDF),
            )]
        });
        let report = controller.add_files(category, files)?;
        println!("- {}: {} file(s) staged", category.label(), report.accepted);
        if let Some(warning) = report.warning() {
            println!("  Warning: {warning}");
        }
    }

    controller.update(FieldUpdate::Payment(PaymentField::PhoneNumber(
        "0712345678".to_string(),
    )))?;
    controller.update(FieldUpdate::Payment(PaymentField::TransactionCode(
        "QWE12RTY34".to_string(),
    )))?;
    controller.update(FieldUpdate::Consent(!skip_consent))?;

    println!("\nSteps");
    while controller.step() != WizardStep::Review {
        let from = controller.step();
        match controller.next() {
            Ok(to) => println!("- {} -> {}", from, to),
            Err(WizardError::Rejected { step, errors }) => {
                println!("- {} blocked:", step);
                for (field, message) in errors.iter() {
                    println!("    {field}: {message}");
                }
                controller.flush_progress();
                println!("Progress saved; rerun the demo to resume.");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
    }

    render_review(&controller.draft());

    let receipt = match controller.submit().await {
        Ok(receipt) => receipt,
        Err(err) => {
            controller.flush_progress();
            println!("Submission failed; progress saved, rerun the demo to retry.");
            return Err(err.into());
        }
    };
    info!(submission_id = %receipt.submission_id, "demo submission complete");
    println!("\nSubmitted {}", receipt.submission_id);
    for (category, path) in &receipt.uploaded {
        println!("- {} stored at {}", category.label(), path);
    }
    let row = serde_json::to_string_pretty(&receipt.record)
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
    println!("Recorded row:\n{row}");

    let total = stack.records.count(&config.storage.submissions_table).await?;
    println!("{} submission(s) on record", total);
    Ok(())
}

fn render_review(draft: &background_intake::intake::Draft) {
    let personal = &draft.personal;
    println!("\nReview");
    println!(
        "- {} {} | {} | {}",
        personal.first_name, personal.second_name, personal.phone, personal.email
    );
    println!(
        "- ID {} | {}, {} | {}",
        personal.id_number, personal.county, personal.country, personal.physical_address
    );
    for category in DocumentCategory::ALL {
        if let Some(files) = draft.documents.files(category) {
            for file in files {
                println!(
                    "- {}: {} ({})",
                    category.label(),
                    file.name,
                    format_file_size(file.size)
                );
            }
        }
    }
    println!(
        "- Payment from {} (code {})",
        draft.payment.phone_number, draft.payment.transaction_code
    );
    if let Some(consented_at) = draft.consent.consent_date {
        println!("- Consent given at {}", consented_at.to_rfc3339());
    }
}
