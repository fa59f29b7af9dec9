use crate::infra::RecordingNotifier;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use clap::Args;
use rentwise::access::{Actor, InMemoryAccessTokens, InMemoryUserDirectory, Role, UserAccount};
use rentwise::clock::{Clock, ManualClock};
use rentwise::config::{IdentityProviderConfig, Secret};
use rentwise::error::AppError;
use rentwise::notify::Notification;
use rentwise::workflows::payments::{
    sign_body, CheckoutRequest, CheckoutSettings, GatewayCheckout, GatewayError, GatewayStatus,
    GatewayVerification, InMemoryPaymentRepository, InitializePayment, PaymentGateway,
    PaymentReconciler, PaymentType, TransactionRef, WebhookEvent,
};
use rentwise::workflows::rental::{
    ApplicationStatus, ApplicationSubmission, InMemoryRentalRepository, Milestone, PropertyId,
    PropertyListing, PropertyStatus, ProposedTerms, RentalApplicationService, RentalRepository,
};
use rentwise::workflows::verification::{
    AuthorizationUrlBuilder, IdentityProvider, IdentityVerificationService,
    InMemorySessionStore, ProviderError, ProviderTokens,
};
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

const DEMO_WEBHOOK_SECRET: &str = "whsec-demo";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Monthly rent in ETB used for the application and its first payment.
    #[arg(long, default_value_t = 18_000)]
    pub(crate) rent: u64,
    /// Let 31 simulated minutes pass before the provider callback, showing session expiry.
    #[arg(long)]
    pub(crate) late_callback: bool,
}

/// Identity provider double that accepts any code and answers with a fixed citizen record.
struct DemoIdentityProvider;

#[async_trait]
impl IdentityProvider for DemoIdentityProvider {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderTokens, ProviderError> {
        if code.is_empty() || code_verifier.is_empty() {
            return Err(ProviderError::Status {
                status: 400,
                body: "invalid_grant".to_string(),
            });
        }
        Ok(ProviderTokens {
            access_token: format!("demo-access-{code}"),
            id_token: None,
        })
    }

    async fn fetch_userinfo(&self, _access_token: &str) -> Result<Value, ProviderError> {
        Ok(json!({
            "sub": "fayda-4471-0932",
            "name": "Abebe Kebede",
            "phone_number": "0911 22 33 44",
        }))
    }
}

/// Gateway double that hands out checkout links and reports every transaction as paid.
struct DemoGateway;

#[async_trait]
impl PaymentGateway for DemoGateway {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<GatewayCheckout, GatewayError> {
        Ok(GatewayCheckout {
            checkout_url: format!("https://checkout.demo.local/pay/{}", request.tx_ref),
            raw: json!({ "status": "success" }),
        })
    }

    async fn verify(&self, tx_ref: &TransactionRef) -> Result<GatewayVerification, GatewayError> {
        Ok(GatewayVerification {
            status: Some(GatewayStatus::Success),
            raw: json!({ "data": { "status": "success", "tx_ref": tx_ref.0 } }),
        })
    }
}

fn demo_identity_config() -> Result<IdentityProviderConfig, AppError> {
    let parse = |raw: &str| {
        Url::parse(raw).map_err(|err| AppError::Demo(format!("url {raw}: {err}")))
    };
    Ok(IdentityProviderConfig {
        client_id: "rentwise-demo".to_string(),
        client_secret: Secret::new("demo-secret"),
        authorize_url: parse("https://id.demo.local/authorize")?,
        token_url: parse("https://id.demo.local/oauth/token")?,
        userinfo_url: parse("https://id.demo.local/oauth/userinfo")?,
        redirect_uri: parse("https://rentwise.demo.local/verify/callback")?,
        scopes: vec![
            "openid".to_string(),
            "profile".to_string(),
            "phone".to_string(),
        ],
        acr_values: None,
        timeout: std::time::Duration::from_secs(10),
    })
}

fn unverified(actor: &Actor, name: &str) -> UserAccount {
    UserAccount {
        id: actor.user_id.clone(),
        role: actor.role,
        display_name: Some(name.to_string()),
        phone: None,
        identity: None,
    }
}

fn step_failed(step: &str) -> impl Fn(String) -> AppError + '_ {
    move |reason| AppError::Demo(format!("step '{step}' failed: {reason}"))
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        rent,
        late_callback,
    } = args;

    let start = Utc
        .with_ymd_and_hms(2025, 11, 3, 9, 0, 0)
        .single()
        .ok_or_else(|| AppError::Demo("invalid start time".to_string()))?;
    let clock = ManualClock::new(start);
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let notifier = RecordingNotifier::default();

    let tenant = Actor::new("tenant-abebe", Role::Tenant);
    let landlord = Actor::new("landlord-sara", Role::Landlord);
    let users = Arc::new(InMemoryUserDirectory::default());
    users.insert(unverified(&tenant, "Abebe"));
    users.insert(unverified(&landlord, "Sara Tesfaye"));
    let tokens = Arc::new(InMemoryAccessTokens::default());

    let rental_store = Arc::new(InMemoryRentalRepository::default());
    let property_id = PropertyId("prop-bole-12".to_string());
    rental_store
        .upsert_property(PropertyListing {
            id: property_id.clone(),
            landlord_id: landlord.user_id.clone(),
            title: "Two bedroom near Bole Medhanealem".to_string(),
            monthly_rent: rent,
            status: PropertyStatus::Available,
            available: true,
        })
        .map_err(|err| step_failed("seed property")(err.to_string()))?;

    let identity_config = demo_identity_config()?;
    let verification = IdentityVerificationService::new(
        Arc::new(InMemorySessionStore::default()),
        Arc::new(DemoIdentityProvider),
        AuthorizationUrlBuilder::new(&identity_config),
        users.clone(),
        tokens,
        shared_clock.clone(),
    );
    let rentals = Arc::new(RentalApplicationService::new(
        rental_store.clone(),
        Arc::new(notifier.clone()),
        shared_clock.clone(),
    ));
    let payments = PaymentReconciler::new(
        Arc::new(InMemoryPaymentRepository::default()),
        Arc::new(DemoGateway),
        rentals.clone(),
        users,
        Arc::new(notifier.clone()),
        shared_clock,
        CheckoutSettings {
            currency: "ETB".to_string(),
            callback_url: "https://rentwise.demo.local/api/v1/payments/webhook".to_string(),
            return_url: "https://rentwise.demo.local/payments/done".to_string(),
            webhook_secret: Some(Secret::new(DEMO_WEBHOOK_SECRET)),
        },
    );

    println!("Rentwise demo");
    println!("\n1. Identity verification");
    let redirect = verification
        .authorize(&tenant)
        .map_err(|err| step_failed("authorize")(err.to_string()))?;
    println!("   redirect: {}", redirect.authorization_url);

    if late_callback {
        clock.advance(Duration::minutes(31));
        match verification.callback("demo-code", &redirect.state).await {
            Ok(_) => println!("   unexpected: late callback accepted"),
            Err(err) => println!("   callback after 31 minutes rejected: {err}"),
        }
        println!("   restarting verification");
        let retry = verification
            .authorize(&tenant)
            .map_err(|err| step_failed("authorize")(err.to_string()))?;
        complete_verification(&verification, &retry.state).await?;
    } else {
        complete_verification(&verification, &redirect.state).await?;
    }

    println!("\n2. Rental application");
    let submission = ApplicationSubmission {
        property_id,
        terms: ProposedTerms {
            monthly_rent: rent,
            deposit: rent * 2,
            currency: "ETB".to_string(),
            lease_months: 12,
            move_in: NaiveDate::from_ymd_opt(2025, 12, 1)
                .ok_or_else(|| AppError::Demo("invalid move-in date".to_string()))?,
        },
        message: Some("Available for a viewing any weekday afternoon".to_string()),
    };
    let application = rentals
        .submit(&tenant, submission)
        .map_err(|err| step_failed("submit")(err.to_string()))?;
    println!("   submitted {} ({})", application.id, application.status());

    for next in [ApplicationStatus::UnderReview, ApplicationStatus::Approved] {
        clock.advance(Duration::hours(4));
        let updated = rentals
            .transition(&landlord, &application.id, next, None)
            .map_err(|err| step_failed("review")(err.to_string()))?;
        println!("   landlord moved it to {}", updated.status());
    }
    let listing = rental_store
        .property(&application.property_id)
        .map_err(|err| step_failed("property lookup")(err.to_string()))?;
    if let Some(listing) = listing {
        println!("   property {} is now {:?}", listing.id, listing.status);
    }

    println!("\n3. First rent payment");
    let intent = payments
        .initialize(
            &tenant,
            InitializePayment {
                rental_id: application.id.clone(),
                amount: rent,
                payment_type: PaymentType::Rent,
                due_date: None,
            },
        )
        .await
        .map_err(|err| step_failed("initialize payment")(err.to_string()))?;
    println!("   checkout: {}", intent.checkout_url);

    clock.advance(Duration::minutes(3));
    let body = serde_json::to_vec(&json!({
        "event": "charge.success",
        "tx_ref": intent.tx_ref.0,
        "status": "success",
        "amount": format!("{rent}.00"),
        "currency": "ETB",
    }))
    .map_err(|err| step_failed("webhook body")(err.to_string()))?;
    let signature = sign_body(&Secret::new(DEMO_WEBHOOK_SECRET), &body);
    for attempt in ["first delivery", "gateway retry"] {
        if !payments.authenticate_webhook(&body, Some(&signature)) {
            return Err(step_failed("webhook")("signature rejected".to_string()));
        }
        let event = WebhookEvent::parse(&body)
            .map_err(|err| step_failed("webhook")(err.to_string()))?;
        let outcome = payments
            .handle_webhook(event)
            .map_err(|err| step_failed("webhook")(err.to_string()))?;
        println!("   webhook {attempt}: {outcome:?}");
    }
    let payment = payments
        .verify(&intent.tx_ref)
        .await
        .map_err(|err| step_failed("verify")(err.to_string()))?;
    println!(
        "   payment {} is {} ({} {}), paid at {}",
        payment.tx_ref,
        payment.status(),
        payment.amount,
        payment.currency,
        payment
            .paid_at()
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    );

    println!("\n4. Hand-over");
    rentals
        .transition(&landlord, &application.id, ApplicationStatus::ContractPending, None)
        .map_err(|err| step_failed("contract")(err.to_string()))?;
    for (actor, milestone) in [
        (&tenant, Milestone::ContractSigned),
        (&tenant, Milestone::AgreementAccepted),
        (&landlord, Milestone::KeysHandedOver),
    ] {
        rentals
            .record_milestone(actor, &application.id, milestone)
            .map_err(|err| step_failed("milestone")(err.to_string()))?;
        println!("   {milestone:?} recorded");
    }
    let completed = rentals
        .transition(&landlord, &application.id, ApplicationStatus::Completed, None)
        .map_err(|err| step_failed("complete")(err.to_string()))?;
    println!("   application {} is {}", completed.id, completed.status());

    println!("\nNotifications");
    for Notification {
        template,
        recipient,
        reference,
        ..
    } in notifier.drain()
    {
        println!("   {template:<28} -> {:<14} ({reference})", recipient.0);
    }

    Ok(())
}

async fn complete_verification(
    verification: &IdentityVerificationService<InMemorySessionStore, DemoIdentityProvider>,
    state: &str,
) -> Result<(), AppError> {
    let outcome = verification
        .callback("demo-code", state)
        .await
        .map_err(|err| step_failed("callback")(err.to_string()))?;
    println!(
        "   verified {} as {} ({:?})",
        outcome.user.id,
        outcome.user.display_name.as_deref().unwrap_or("-"),
        outcome.user.kyc_status()
    );
    Ok(())
}
