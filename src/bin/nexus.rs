//! Interactive Nexus agent: search, send the results by email, scan every topic.

use anyhow::Result;
use nexus::notify::{send_newsletter, Delivery};
use nexus::session::SearchSession;
use nexus::{telemetry, Article, Runtime};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

const HELP: &str = "\
Commandes :
  cherche <mot>   trouve des articles précis (ex: cherche inflation)
  envoie mail     envoie ce qu'on vient de trouver
  tout scanner    lance la veille complète
  aide            affiche cette aide
  stop            quitter";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Quit,
    Help,
    Search(Option<String>),
    SendMail,
    FullScan,
    Unknown,
}

fn parse_command(line: &str) -> Command {
    let input = line.trim().to_lowercase();
    if matches!(input.as_str(), "exit" | "stop" | "quitter") {
        return Command::Quit;
    }
    if input.contains("aide") {
        return Command::Help;
    }
    if input.contains("cherche") {
        let query = input
            .split_whitespace()
            .skip_while(|w| !w.contains("cherche"))
            .skip(1)
            .collect::<Vec<_>>()
            .join(" ");
        return Command::Search((!query.is_empty()).then_some(query));
    }
    if input.contains("mail") || input.contains("envoie") {
        return Command::SendMail;
    }
    if input.contains("tout") {
        return Command::FullScan;
    }
    Command::Unknown
}

type Input = Lines<BufReader<Stdin>>;

async fn prompt(lines: &mut Input, question: &str) -> Result<Option<String>> {
    let mut out = tokio::io::stdout();
    out.write_all(question.as_bytes()).await?;
    out.flush().await?;
    Ok(lines.next_line().await?)
}

fn print_articles(articles: &[Article]) {
    for a in articles {
        println!(
            "   - [{}] {} ({})",
            a.sentiment_label.display_fr(),
            a.title,
            a.source
        );
    }
}

async fn run_search(rt: &Runtime, session: &SearchSession, query: &str) {
    println!("Recherche : '{}'...", query.to_uppercase());
    let topics: Vec<String> = rt.pipeline.catalog().topics().map(str::to_string).collect();
    let mut found = Vec::new();
    for (topic, articles) in rt.pipeline.scrape_topics(&topics, Some(query)).await {
        if articles.is_empty() {
            continue;
        }
        println!("   {topic} : {} trouvé(s)", articles.len());
        print_articles(&articles);
        found.extend(articles);
    }
    if found.is_empty() {
        println!("Rien trouvé pour '{query}'.");
    } else {
        println!("{} articles en mémoire ! Tapez 'envoie mail' pour les recevoir.", found.len());
    }
    session.store_results(query, found);
}

async fn run_full_cycle(rt: &Runtime, session: &SearchSession) {
    println!("Cycle complet...");
    let mut all = Vec::new();
    for (topic, articles) in rt.pipeline.run_full_cycle().await {
        println!("   {topic} : {}", articles.len());
        all.extend(articles);
    }
    println!("{} articles récupérés.", all.len());
    session.store_results("", all);
}

async fn send_mail(rt: &Runtime, session: &SearchSession, lines: &mut Input) -> Result<()> {
    let Some(mailer) = rt.mailer.as_deref() else {
        println!("Email non configuré (SMTP_HOST, SMTP_USER, SMTP_PASS, NEWSLETTER_FROM).");
        return Ok(());
    };
    let Ok(to) = std::env::var("USER_EMAIL") else {
        println!("Aucun email configuré : ajoutez USER_EMAIL=votre@email.com dans le .env");
        return Ok(());
    };

    let articles = match session.last_articles() {
        Some(a) => {
            println!("Envoi des {} articles de la recherche...", a.len());
            a
        }
        None => {
            println!("Pas de recherche en mémoire.");
            let answer = prompt(lines, "Envoyer tout le stock ? (o/n) ").await?;
            if !matches!(answer.as_deref().map(str::trim), Some("o" | "y" | "oui")) {
                return Ok(());
            }
            Vec::new()
        }
    };

    let store = rt.store.as_ref();
    match send_newsletter(mailer, store, &[to], articles).await? {
        Delivery::Sent { failed: 0, articles, .. } => println!("Mail envoyé ! ({articles} articles)"),
        Delivery::Sent { .. } => println!("L'envoi a échoué, voir les logs."),
        Delivery::NothingToSend => println!("Aucun article disponible à envoyer."),
        Delivery::NoRecipients => println!("Aucun destinataire."),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let rt = Runtime::from_env().await?;
    let session = SearchSession::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("NEXUS AGENT - je cherche, je filtre, j'envoie. Tapez 'aide'.");
    loop {
        let Some(line) = prompt(&mut lines, "\nNexus > ").await? else {
            break;
        };
        match parse_command(&line) {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Search(Some(q)) => run_search(&rt, &session, &q).await,
            Command::Search(None) => {
                if let Some(q) = prompt(&mut lines, "Quel mot-clé ? ").await? {
                    let q = q.trim();
                    if !q.is_empty() {
                        run_search(&rt, &session, q).await;
                    }
                }
            }
            Command::SendMail => {
                if let Err(e) = send_mail(&rt, &session, &mut lines).await {
                    tracing::warn!(error = ?e, "newsletter send failed");
                    println!("Erreur lors de l'envoi : {e}");
                }
            }
            Command::FullScan => run_full_cycle(&rt, &session).await,
            Command::Unknown => println!("? Tapez 'aide'."),
        }
    }
    Ok(())
}
