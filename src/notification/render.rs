use crate::notification::model::{EventType, NotificationError, NotificationEvent, RecipientContact};
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde_json::{Map, Value};

const BRAND: &str = "قَلم";
const BRAND_TAGLINE: &str = "قَلم - منصة الكتابة العربية";
const SETTINGS_LABEL: &str = "تعديل الإشعارات";
const TEXT_RULE: &str = "────────────────────────";

const DEFAULT_RECIPIENT_NAME: &str = "عزيزي القارئ";
const DEFAULT_AUTHOR_NAME: &str = "كاتبنا العزيز";
const DEFAULT_ACTOR_NAME: &str = "مستخدم";
const DEFAULT_OWN_ARTICLE_TITLE: &str = "مقالك";
const DEFAULT_NEW_ARTICLE_TITLE: &str = "مقال جديد";
const DEFAULT_COMMENT_EXCERPT: &str = "تم إضافة تعليق جديد.";
const DEFAULT_PUBLISH_EXCERPT: &str = "اكتشف هذا المقال الجديد.";

const COLOR_TEXT: &str = "#242424";
const COLOR_TEXT_LIGHT: &str = "#6B6B6B";
const COLOR_TEXT_MUTED: &str = "#757575";
const COLOR_BACKGROUND: &str = "#FFFFFF";
const COLOR_PAGE: &str = "#F7F4ED";
const COLOR_BORDER: &str = "#F2F2F2";

const FONT_SERIF: &str =
    "'Aref Ruqaa', 'Scheherazade New', 'Arabic Typesetting', 'Traditional Arabic', Georgia, serif";
const FONT_SANS: &str =
    "'Almarai', 'Cairo', 'Noto Sans Arabic', 'Segoe UI', 'Helvetica Neue', Arial, sans-serif";

/// Subject and both body variants of a notification email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Builds notification emails. Holds no state besides the site base URL.
#[derive(Debug, Clone)]
pub struct ContentRenderer {
    base_url: String,
}

impl ContentRenderer {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Render the email for `event`.
    ///
    /// Fails only when the payload is malformed: not an object, or a known
    /// field holding something other than a string.
    pub fn render(
        &self,
        event: &NotificationEvent,
        recipient: &RecipientContact,
        actor_name: Option<&str>,
    ) -> Result<RenderedMessage, NotificationError> {
        let payload = Payload::new(&event.payload)?;
        let recipient_name = recipient
            .display_name
            .as_deref()
            .unwrap_or(DEFAULT_RECIPIENT_NAME);
        let actor = actor_name.unwrap_or(DEFAULT_ACTOR_NAME);

        let message = match &event.event_type {
            EventType::Comment => {
                let title = payload
                    .text("article_title")?
                    .unwrap_or(DEFAULT_OWN_ARTICLE_TITLE);
                let excerpt = payload
                    .text("comment_excerpt")?
                    .unwrap_or(DEFAULT_COMMENT_EXCERPT);
                let url = self.article_url(payload.text("article_slug")?);

                RenderedMessage {
                    subject: format!("{} علّق على مقالك", actor),
                    text: self.with_text_footer(format!(
                        "{actor} علّق على مقالك\n\nعلى: {title}\n\n\"{excerpt}\"\n\nعرض التعليق والرد:\n{url}"
                    )),
                    html: self.shell(&comment_block(recipient_name, actor, title, excerpt, &url)),
                }
            }
            EventType::Like => {
                let title = payload
                    .text("article_title")?
                    .unwrap_or(DEFAULT_OWN_ARTICLE_TITLE);
                let url = self.article_url(payload.text("article_slug")?);

                RenderedMessage {
                    subject: format!("{} أعجب بمقالك", actor),
                    text: self.with_text_footer(format!(
                        "{actor} أعجب بمقالك\n\n{title}\n\nمقالاتك تلقى صدى لدى القرّاء. استمر في الكتابة.\n\nمشاهدة المقال:\n{url}"
                    )),
                    html: self.shell(&like_block(recipient_name, actor, title, &url)),
                }
            }
            EventType::Follow => {
                let actor_id = event.actor_id.map(|id| id.to_string()).unwrap_or_default();
                let url = format!("{}/author/{}", self.base_url, actor_id);

                RenderedMessage {
                    subject: format!("{} بدأ بمتابعتك", actor),
                    text: self.with_text_footer(format!(
                        "{actor} بدأ بمتابعتك على {BRAND}\n\nلديك الآن قارئ جديد سيصله إشعار بكل مقال تنشره.\n\nعرض الملف الشخصي:\n{url}"
                    )),
                    html: self.shell(&follow_block(recipient_name, actor, &url)),
                }
            }
            // Publish doubles as the layout for event kinds without their own template.
            EventType::Publish | EventType::Other(_) => {
                let title = payload
                    .text("article_title")?
                    .unwrap_or(DEFAULT_NEW_ARTICLE_TITLE);
                let excerpt = payload.text("excerpt")?.unwrap_or(DEFAULT_PUBLISH_EXCERPT);
                let url = self.article_url(payload.text("article_slug")?);

                RenderedMessage {
                    subject: format!("{}: {}", actor, title),
                    text: self.with_text_footer(format!(
                        "{actor} نشر مقالاً جديداً على {BRAND}\n\n{title}\n\n{excerpt}\n\nاقرأ المقال:\n{url}"
                    )),
                    html: self.shell(&publish_block(recipient_name, actor, title, excerpt, &url)),
                }
            }
        };

        Ok(message)
    }

    /// Email telling an author that an editor published their article.
    pub fn render_approval(
        &self,
        author_name: Option<&str>,
        title: &str,
        slug: &str,
        review_notes: Option<&str>,
    ) -> RenderedMessage {
        let name = author_name.unwrap_or(DEFAULT_AUTHOR_NAME);
        let url = self.article_url(Some(slug));

        let mut text = format!(
            "{name},\n\nيسعدنا إبلاغك بأن فريق التحرير اعتمد مقالتك وتم نشرها على منصة {BRAND}.\n\nالعنوان: {title}\nالرابط: {url}"
        );
        if let Some(notes) = review_notes {
            text.push_str(&format!("\n\nملاحظات المحرر:\n{notes}"));
        }
        text.push_str(&format!("\n\nنتطلع إلى المزيد من إبداعاتك.\n\nفريق {BRAND}"));

        RenderedMessage {
            subject: format!("تم نشر مقالتك على {BRAND}"),
            text,
            html: self.shell(&approval_block(name, title, review_notes, &url)),
        }
    }

    fn article_url(&self, slug: Option<&str>) -> String {
        match slug {
            Some(slug) if !slug.is_empty() => format!("{}/article/{}", self.base_url, slug),
            _ => self.base_url.clone(),
        }
    }

    fn settings_url(&self) -> String {
        format!("{}/settings/notifications", self.base_url)
    }

    fn with_text_footer(&self, body: String) -> String {
        format!(
            "{body}\n\n{TEXT_RULE}\n\n{BRAND_TAGLINE}\n{SETTINGS_LABEL}: {}",
            self.settings_url()
        )
    }

    /// Shared page around every content card: brand header, card, footer.
    fn shell(&self, content: &str) -> String {
        let home = encode_double_quoted_attribute(&self.base_url);
        let settings = encode_double_quoted_attribute(&self.settings_url()).into_owned();

        format!(
            r#"<!DOCTYPE html>
<html lang="ar" dir="rtl">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
  </head>
  <body style="margin:0;padding:0;background:{COLOR_PAGE};font-family:{FONT_SANS};direction:rtl;">
    <table role="presentation" style="width:100%;border-collapse:collapse;background:{COLOR_PAGE};">
      <tr>
        <td align="center" style="padding:0;">
          <table role="presentation" style="max-width:680px;width:100%;margin:50px auto 0;">
            <tr>
              <td style="padding:0 20px 40px;text-align:center;">
                <h1 style="margin:0;font-size:42px;font-weight:400;font-family:{FONT_SERIF};color:{COLOR_TEXT};">{BRAND}</h1>
              </td>
            </tr>
          </table>
          <table role="presentation" style="max-width:680px;width:100%;background:{COLOR_BACKGROUND};margin:0 auto;">
            {content}
          </table>
          <table role="presentation" style="max-width:680px;width:100%;margin:0 auto;">
            <tr>
              <td style="padding:40px 20px;text-align:center;">
                <p style="margin:0 0 12px;font-size:14px;color:{COLOR_TEXT_MUTED};line-height:1.6;">
                  <a href="{home}" style="color:{COLOR_TEXT};text-decoration:none;margin:0 8px;">{BRAND}</a>
                  <span style="color:{COLOR_BORDER};">·</span>
                  <a href="{settings}" style="color:{COLOR_TEXT_MUTED};text-decoration:none;margin:0 8px;">{SETTINGS_LABEL}</a>
                </p>
              </td>
            </tr>
          </table>
        </td>
      </tr>
    </table>
  </body>
</html>"#
        )
    }
}

/// Read access to the loosely typed event payload
struct Payload<'p> {
    fields: Option<&'p Map<String, Value>>,
}

impl<'p> Payload<'p> {
    fn new(payload: &'p Value) -> Result<Self, NotificationError> {
        match payload {
            Value::Object(fields) => Ok(Self {
                fields: Some(fields),
            }),
            Value::Null => Ok(Self { fields: None }),
            _ => Err(NotificationError::InvalidPayload(
                "payload must be an object".to_string(),
            )),
        }
    }

    fn text(&self, field: &str) -> Result<Option<&'p str>, NotificationError> {
        match self.fields.and_then(|fields| fields.get(field)) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.as_str())),
            Some(_) => Err(NotificationError::InvalidPayload(format!(
                "{} must be a string",
                field
            ))),
        }
    }
}

fn initial(name: &str) -> String {
    name.chars().next().map(String::from).unwrap_or_default()
}

fn actor_badge(actor: &str, caption: &str, size: u32) -> String {
    format!(
        r#"<table role="presentation" width="100%" style="margin-bottom:28px;">
          <tr>
            <td style="width:{size}px;vertical-align:middle;">
              <div style="width:{size}px;height:{size}px;line-height:{size}px;background:{COLOR_TEXT};border-radius:50%;text-align:center;">
                <span style="color:{COLOR_BACKGROUND};font-weight:500;font-size:18px;">{initial}</span>
              </div>
            </td>
            <td style="padding-right:12px;vertical-align:middle;">
              <p style="margin:0;font-size:16px;font-weight:500;color:{COLOR_TEXT};">{actor}</p>
              <p style="margin:4px 0 0;font-size:14px;color:{COLOR_TEXT_MUTED};">{caption}</p>
            </td>
          </tr>
        </table>"#,
        initial = encode_text(&initial(actor)),
        actor = encode_text(actor),
    )
}

fn greeting(recipient_name: &str) -> String {
    format!(
        r#"<p style="margin:0 0 24px;font-size:15px;color:{COLOR_TEXT_LIGHT};">مرحباً {},</p>"#,
        encode_text(recipient_name)
    )
}

fn kind_label(label: &str) -> String {
    format!(
        r#"<p style="margin:0 0 24px;font-size:14px;color:{COLOR_TEXT_MUTED};letter-spacing:0.5px;">{label}</p>"#
    )
}

fn call_to_action(url: &str, label: &str) -> String {
    format!(
        r#"<div style="height:1px;background:{COLOR_BORDER};margin:40px 0;"></div>
        <a href="{href}" style="display:inline-block;padding:12px 24px;background:{COLOR_TEXT};color:{COLOR_BACKGROUND};text-decoration:none;font-size:16px;font-weight:500;border-radius:4px;">{label}</a>"#,
        href = encode_double_quoted_attribute(url),
    )
}

fn card(inner: String) -> String {
    format!(
        r#"<tr>
      <td style="padding:50px 50px 60px;">
        {inner}
      </td>
    </tr>"#
    )
}

fn publish_block(recipient: &str, author: &str, title: &str, excerpt: &str, url: &str) -> String {
    card(format!(
        r#"{greeting}
        {badge}
        <h2 style="margin:0 0 24px;font-size:32px;font-weight:700;color:{COLOR_TEXT};font-family:{FONT_SERIF};line-height:1.3;">{title}</h2>
        <p style="margin:0 0 32px;font-size:18px;color:{COLOR_TEXT_LIGHT};line-height:1.7;">{excerpt}</p>
        {cta}"#,
        greeting = greeting(recipient),
        badge = actor_badge(author, "نشر مقالاً جديداً", 48),
        title = encode_text(title),
        excerpt = encode_text(excerpt),
        cta = call_to_action(url, "اقرأ المقال"),
    ))
}

fn comment_block(recipient: &str, commenter: &str, title: &str, excerpt: &str, url: &str) -> String {
    card(format!(
        r#"{label}
        {greeting}
        {badge}
        <p style="margin:0 0 20px;font-size:15px;color:{COLOR_TEXT_LIGHT};">
          على: <a href="{href}" style="color:{COLOR_TEXT};text-decoration:none;font-weight:500;">{title}</a>
        </p>
        <div style="padding:24px;background:#FAFAFA;border-right:3px solid {COLOR_TEXT};margin:24px 0;">
          <p style="margin:0;font-size:17px;color:{COLOR_TEXT};line-height:1.7;font-style:italic;">"{excerpt}"</p>
        </div>
        {cta}"#,
        label = kind_label("تعليق جديد"),
        greeting = greeting(recipient),
        badge = actor_badge(commenter, "علّق على مقالك", 40),
        href = encode_double_quoted_attribute(url),
        title = encode_text(title),
        excerpt = encode_text(excerpt),
        cta = call_to_action(url, "عرض التعليق والرد"),
    ))
}

fn like_block(recipient: &str, liker: &str, title: &str, url: &str) -> String {
    card(format!(
        r#"{label}
        {greeting}
        {badge}
        <h3 style="margin:0 0 32px;font-size:24px;font-weight:600;color:{COLOR_TEXT};font-family:{FONT_SERIF};line-height:1.4;">{title}</h3>
        <p style="margin:0 0 32px;font-size:17px;color:{COLOR_TEXT_LIGHT};line-height:1.7;">
          مقالاتك تلقى صدى لدى القرّاء. استمر في الكتابة ومشاركة أفكارك.
        </p>
        {cta}"#,
        label = kind_label("إعجاب جديد"),
        greeting = greeting(recipient),
        badge = actor_badge(liker, "أعجب بمقالك", 40),
        title = encode_text(title),
        cta = call_to_action(url, "مشاهدة المقال"),
    ))
}

fn follow_block(recipient: &str, follower: &str, url: &str) -> String {
    card(format!(
        r#"{label}
        {greeting}
        {badge}
        <p style="margin:32px 0;font-size:17px;color:{COLOR_TEXT_LIGHT};line-height:1.7;">
          لديك الآن قارئ جديد سيصله إشعار بكل مقال تنشره. استمر في مشاركة كتاباتك.
        </p>
        {cta}"#,
        label = kind_label("متابع جديد"),
        greeting = greeting(recipient),
        badge = actor_badge(follower, "بدأ بمتابعتك", 48),
        cta = call_to_action(url, "عرض الملف الشخصي"),
    ))
}

fn approval_block(author: &str, title: &str, notes: Option<&str>, url: &str) -> String {
    let notes = notes
        .map(|notes| {
            format!(
                r#"<div style="margin:0 0 32px;padding:24px;background:#FAFAFA;border-right:3px solid {COLOR_TEXT};">
          <p style="margin:0 0 8px;font-size:14px;color:{COLOR_TEXT_MUTED};">ملاحظات المحرر</p>
          <p style="margin:0;font-size:16px;color:{COLOR_TEXT};line-height:1.7;">{}</p>
        </div>"#,
                encode_text(notes).replace('\n', "<br />")
            )
        })
        .unwrap_or_default();

    card(format!(
        r#"{label}
        <p style="margin:0 0 24px;font-size:17px;color:{COLOR_TEXT};">{author} العزيز،</p>
        <p style="margin:0 0 32px;font-size:17px;color:{COLOR_TEXT_LIGHT};line-height:1.8;">
          يسعدنا إبلاغك بأن فريق التحرير اعتمد مقالتك
          <strong style="color:{COLOR_TEXT};">«{title}»</strong>
          وتم نشرها الآن على منصة {BRAND}.
        </p>
        {notes}
        {cta}"#,
        label = kind_label("تم النشر"),
        author = encode_text(author),
        title = encode_text(title),
        cta = call_to_action(url, "مشاهدة المقال"),
    ))
}
