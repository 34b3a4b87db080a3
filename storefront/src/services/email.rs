// kloven_storefront/src/services/email.rs

//! Order confirmation email: rendering and delivery through Resend.

use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{instrument, warn};

use crate::errors::{AppError, Result as AppResult};
use crate::models::OrderWithItems;

const RESEND_EMAILS_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
  pub from: String,
  pub to: String,
  pub subject: String,
  pub html: String,
}

#[automock]
#[async_trait]
pub trait Mailer: Send + Sync {
  async fn send(&self, email: OutgoingEmail) -> AppResult<()>;
}

#[derive(Debug, Clone)]
pub struct ResendMailer {
  http: Client,
  api_key: String,
}

impl ResendMailer {
  pub fn new(api_key: &str) -> AppResult<Self> {
    let http = Client::builder()
      .timeout(Duration::from_secs(10))
      .build()
      .map_err(|e| AppError::Config(format!("Could not build email HTTP client: {}", e)))?;
    Ok(Self {
      http,
      api_key: api_key.to_string(),
    })
  }
}

#[async_trait]
impl Mailer for ResendMailer {
  #[instrument(name = "resend::send", skip_all, fields(to = %email.to, subject = %email.subject))]
  async fn send(&self, email: OutgoingEmail) -> AppResult<()> {
    let response = self
      .http
      .post(RESEND_EMAILS_URL)
      .bearer_auth(&self.api_key)
      .json(&email)
      .send()
      .await
      .map_err(|e| AppError::Email(format!("send request failed: {}", e)))?;

    if !response.status().is_success() {
      let status = response.status();
      let text = response.text().await.unwrap_or_default();
      warn!(%status, body = %text, "Email provider rejected message.");
      return Err(AppError::Email(format!("send failed with status {}: {}", status, text)));
    }
    Ok(())
  }
}

/// `25000` -> `"25.000"`, the es-AR grouping used on the storefront.
pub fn format_ars(amount: i64) -> String {
  let digits = amount.unsigned_abs().to_string();
  let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
  for (idx, ch) in digits.chars().enumerate() {
    if idx > 0 && (digits.len() - idx) % 3 == 0 {
      grouped.push('.');
    }
    grouped.push(ch);
  }
  if amount < 0 {
    format!("-{}", grouped)
  } else {
    grouped
  }
}

fn escape_html(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  for ch in raw.chars() {
    match ch {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      _ => out.push(ch),
    }
  }
  out
}

pub fn order_confirmation_subject(order: &OrderWithItems) -> String {
  let short_id: String = order.order.id.to_string().chars().take(8).collect();
  format!("Kloven - Confirmacion de pedido #{}", short_id)
}

pub fn order_confirmation_email(order: &OrderWithItems, from: &str) -> OutgoingEmail {
  let o = &order.order;

  let mut item_rows = String::new();
  for item in &order.order_items {
    let _ = write!(
      item_rows,
      r#"
      <tr>
        <td style="padding:12px 16px;border-bottom:1px solid #eee;">
          <strong style="color:#0a0a0a;">{name}</strong><br/>
          <span style="color:#888;font-size:13px;">Talle: {size} | Color: {color}</span><br/>
          <span style="color:#888;font-size:13px;">{qty} x ${unit}</span>
        </td>
        <td style="padding:12px 16px;border-bottom:1px solid #eee;text-align:right;font-weight:bold;">${line_total}</td>
      </tr>"#,
      name = escape_html(&item.product_name),
      size = escape_html(&item.size),
      color = escape_html(&item.color),
      qty = item.quantity,
      unit = format_ars(item.unit_price),
      line_total = format_ars(item.unit_price * i64::from(item.quantity)),
    );
  }

  let discount_row = if o.discount_amount > 0 {
    format!(
      r#"<tr><td style="padding:4px 16px;color:#16a34a;">Descuento</td><td style="padding:4px 16px;text-align:right;color:#16a34a;">-${}</td></tr>"#,
      format_ars(o.discount_amount)
    )
  } else {
    String::new()
  };
  let shipping = if o.shipping_cost == 0 {
    "Gratis".to_string()
  } else {
    format!("${}", format_ars(o.shipping_cost))
  };

  let html = format!(
    r#"
  <div style="background:#f5f5f5;padding:40px 0;font-family:system-ui,sans-serif;">
    <div style="max-width:560px;margin:0 auto;background:#ffffff;border:1px solid #eee;border-radius:4px;overflow:hidden;">
      <div style="height:4px;background:#D90429;"></div>
      <div style="padding:32px;">
        <h1 style="color:#0a0a0a;font-size:24px;margin:0 0 4px;font-weight:900;">KLOVEN<span style="color:#D90429;">.</span></h1>
        <p style="color:#888;font-size:13px;margin:0 0 24px;">Confirmacion de pedido</p>
        <p style="color:#0a0a0a;font-size:15px;margin:0 0 24px;">Hola <strong>{payer}</strong>, gracias por tu compra! Tu pedido esta confirmado.</p>
        <table style="width:100%;border-collapse:collapse;margin-bottom:24px;">
          <tbody>{item_rows}
          </tbody>
        </table>
        <table style="width:100%;border-collapse:collapse;font-size:14px;">
          <tr><td style="padding:4px 16px;color:#666;">Subtotal</td><td style="padding:4px 16px;text-align:right;">${subtotal}</td></tr>
          {discount_row}
          <tr><td style="padding:4px 16px;color:#666;">Envio</td><td style="padding:4px 16px;text-align:right;">{shipping}</td></tr>
          <tr style="border-top:2px solid #0a0a0a;"><td style="padding:12px 16px;font-weight:900;">Total</td><td style="padding:12px 16px;text-align:right;font-weight:900;">${total}</td></tr>
        </table>
        <div style="margin-top:24px;padding:16px;background:#f9f9f9;border:1px solid #eee;border-radius:4px;">
          <p style="margin:0 0 4px;font-size:11px;text-transform:uppercase;color:#888;font-weight:bold;">Direccion de envio</p>
          <p style="margin:0;font-size:14px;color:#0a0a0a;">{address}, {city} ({zip})</p>
        </div>
        <p style="color:#aaa;font-size:12px;margin:32px 0 0;text-align:center;">Kloven Argentina &mdash; Streetwear Redefined</p>
      </div>
    </div>
  </div>"#,
    payer = escape_html(&o.payer_name),
    item_rows = item_rows,
    subtotal = format_ars(o.subtotal),
    discount_row = discount_row,
    shipping = shipping,
    total = format_ars(o.total),
    address = escape_html(&o.shipping_address),
    city = escape_html(&o.shipping_city),
    zip = escape_html(&o.shipping_zip),
  );

  OutgoingEmail {
    from: from.to_string(),
    to: o.payer_email.clone(),
    subject: order_confirmation_subject(order),
    html,
  }
}
