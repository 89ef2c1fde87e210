//! End-to-end tests of the client against an in-process transport.

use anyhow::Result;
use mal_client::api::Method;
use mal_client::{
    ClientError, Credentials, Event, LockBridge, MalClient, Request, ResourceKind, Response,
    TextCleaner, Transport, Verbatim,
};
use shared::{Anime, Config, Manga, MalConfig, SeriesStatus, UserStatus};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const ANIME_LIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<myanimelist>
  <myinfo>
    <user_id>42</user_id>
    <user_name>tester</user_name>
    <user_watching>1</user_watching>
  </myinfo>
  <anime>
    <series_animedb_id>1</series_animedb_id>
    <series_title>Cowboy Bebop</series_title>
    <series_synonyms>; Kaubōi Bebappu</series_synonyms>
    <series_type>1</series_type>
    <series_episodes>26</series_episodes>
    <series_status>2</series_status>
    <series_start>1998-04-03</series_start>
    <series_end>1999-04-24</series_end>
    <series_image>https://cdn.example.test/images/1.jpg</series_image>
    <my_id>0</my_id>
    <my_watched_episodes>26</my_watched_episodes>
    <my_score>9</my_score>
    <my_status>2</my_status>
    <my_rewatching>0</my_rewatching>
    <my_rewatching_ep>0</my_rewatching_ep>
    <my_last_updated>1577836800</my_last_updated>
    <my_tags>space, jazz</my_tags>
  </anime>
  <anime>
    <series_animedb_id>5114</series_animedb_id>
    <series_title>Fullmetal Alchemist: Brotherhood</series_title>
    <series_type>1</series_type>
    <series_episodes>64</series_episodes>
    <series_status>2</series_status>
    <series_start>2009-04-05</series_start>
    <my_watched_episodes>12</my_watched_episodes>
    <my_status>1</my_status>
  </anime>
</myanimelist>"#;

const MANGA_SEARCH: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<manga>
  <entry>
    <id>2</id>
    <title>Berserk</title>
    <english>Berserk</english>
    <synonyms>Berserk: The Prototype</synonyms>
    <chapters>0</chapters>
    <volumes>0</volumes>
    <score>9.4</score>
    <type>Manga</type>
    <status>Publishing</status>
    <start_date>1989-08-25</start_date>
    <end_date>0000-00-00</end_date>
    <synopsis>Guts &mdash; a former mercenary.</synopsis>
    <image>https://cdn.example.test/images/manga/2.jpg</image>
  </entry>
</manga>"#;

const RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Lets a fixed number of parties through only once all of them are waiting
struct Rendezvous {
    arrived: Mutex<usize>,
    all_here: Condvar,
    parties: usize,
}

impl Rendezvous {
    fn new(parties: usize) -> Arc<Self> {
        Arc::new(Self {
            arrived: Mutex::new(0),
            all_here: Condvar::new(),
            parties,
        })
    }

    /// Returns false if the other parties did not arrive in time
    fn wait(&self, timeout: Duration) -> bool {
        let mut arrived = self.arrived.lock().unwrap();
        *arrived += 1;
        self.all_here.notify_all();
        let (arrived, _) = self
            .all_here
            .wait_timeout_while(arrived, timeout, |n| *n < self.parties)
            .unwrap();
        *arrived >= self.parties
    }
}

#[derive(Default)]
struct MockState {
    routes: Vec<(String, Response)>,
    requests: Vec<Request>,
    unreachable: bool,
    /// Holds every request in flight until its peers are too
    gate: Option<Arc<Rendezvous>>,
}

/// Replays canned responses by URL fragment and records every request
#[derive(Clone, Default)]
struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    fn route(&self, fragment: &str, status: u16, body: &str) {
        let mut state = self.state.lock().unwrap();
        state.routes.retain(|(f, _)| f != fragment);
        state
            .routes
            .push((fragment.to_string(), Response::new(status, body)));
    }

    fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    fn set_gate(&self, gate: Arc<Rendezvous>) {
        self.state.lock().unwrap().gate = Some(gate);
    }

    fn requests(&self) -> Vec<Request> {
        self.state.lock().unwrap().requests.clone()
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &Request, locks: &LockBridge) -> mal_client::Result<Response> {
        let (gate, response) = {
            let _held = locks.acquire(&[ResourceKind::Share])?;

            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());
            if state.unreachable {
                return Err(ClientError::transport("connection refused"));
            }

            let response = state
                .routes
                .iter()
                .find(|(fragment, _)| request.url.contains(fragment.as_str()))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| Response::new(404, "not found"));
            (state.gate.clone(), response)
        };

        // In flight: no lock kinds and no mock state held
        if let Some(gate) = gate {
            if !gate.wait(RENDEZVOUS_TIMEOUT) {
                return Err(ClientError::transport("peer requests never arrived"));
            }
        }
        Ok(response)
    }
}

fn mal_config() -> MalConfig {
    MalConfig {
        base_url: "https://mal.example.test".to_string(),
        username: "tester".to_string(),
        ..MalConfig::default()
    }
}

fn client_with(cleaner: Arc<dyn TextCleaner>) -> (MalClient, MockTransport) {
    let transport = MockTransport::default();
    let config = mal_config();
    let credentials = Credentials::new(&config.username, "secret");
    let client = MalClient::new(config, credentials, Box::new(transport.clone()), cleaner);
    (client, transport)
}

fn client() -> (MalClient, MockTransport) {
    client_with(Arc::new(Verbatim))
}

fn titles<T: shared::CatalogItem>(collection: &mal_client::Collection<T>) -> Vec<String> {
    let mut titles = Vec::new();
    collection.for_each(|item| titles.push(item.series().title.clone()));
    titles
}

#[test]
fn test_fetch_anime_list() -> Result<()> {
    let (client, transport) = client();
    transport.route("/malappinfo.php", 200, ANIME_LIST);
    let events = client.subscribe();

    let report = client.fetch_anime_list()?;
    assert_eq!(report.parsed, 2);
    assert_eq!(report.stored, 2);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);

    // Newest season first
    assert_eq!(
        titles(&client.store().anime_list),
        vec!["Fullmetal Alchemist: Brotherhood", "Cowboy Bebop"]
    );

    let bebop = client
        .store()
        .anime_list
        .snapshot()
        .into_iter()
        .find(|a| a.series.id() == Some(1))
        .expect("bebop stored");
    assert_eq!(bebop.series.synonyms, vec!["Kaubōi Bebappu"]);
    assert_eq!(bebop.episodes, 26);
    assert_eq!(bebop.progress.status, UserStatus::Completed);
    assert_eq!(bebop.progress.tags, vec!["space", "jazz"]);
    assert_eq!(bebop.progress.last_updated, 1577836800);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Get);
    assert_eq!(requests[0].query_value("u"), Some("tester"));
    assert_eq!(requests[0].query_value("status"), Some("all"));
    assert_eq!(requests[0].query_value("type"), Some("anime"));
    assert!(!requests[0].is_authenticated());

    assert_eq!(events.try_recv()?, Event::AnimeListUpdated);
    assert!(client.store().manga_list.is_empty());
    Ok(())
}

#[test]
fn test_search_manga_with_cleaner() -> Result<()> {
    let cleaner = |text: String| text.replace("&mdash;", "-");
    let (client, transport) = client_with(Arc::new(cleaner));
    transport.route("/api/manga/search.xml", 200, MANGA_SEARCH);
    let events = client.subscribe();

    let report = client.search_manga("berserk")?;
    assert_eq!(report.parsed, 1);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);

    let results = client.store().manga_search.snapshot();
    let berserk = &results[0];
    assert_eq!(berserk.series.id(), Some(2));
    assert_eq!(berserk.series.status, SeriesStatus::Ongoing);
    assert_eq!(berserk.series.synopsis, "Guts - a former mercenary.");
    assert_eq!(berserk.series.synonyms, vec!["Berserk", "Berserk: The Prototype"]);

    let request = &transport.requests()[0];
    assert_eq!(request.query_value("q"), Some("berserk"));
    assert_eq!(
        request.credentials.as_ref().map(|c| c.username.as_str()),
        Some("tester")
    );

    assert_eq!(events.try_recv()?, Event::MangaSearchCompleted);
    assert!(client.store().anime_search.is_empty());
    Ok(())
}

#[test]
fn test_failed_search_leaves_results_untouched() -> Result<()> {
    let (client, transport) = client();
    transport.route("/api/manga/search.xml", 200, MANGA_SEARCH);
    client.search_manga("berserk")?;
    let events = client.subscribe();

    transport.route("/api/manga/search.xml", 500, "Internal Server Error");
    let err = client.search_manga("berserk").unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 500, .. }));
    assert_eq!(titles(&client.store().manga_search), vec!["Berserk"]);

    transport.set_unreachable(true);
    let err = client.search_manga("berserk").unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(client.store().manga_search.len(), 1);

    assert!(events.try_recv().is_err());
    Ok(())
}

#[test]
fn test_unknown_element_is_reported_not_fatal() -> Result<()> {
    let (client, transport) = client();
    transport.route(
        "/api/anime/search.xml",
        200,
        "<anime><entry><id>5</id><xyz_unknown>x</xyz_unknown><title>Foo</title></entry>\
         <entry><id>7</id><title>Bar</title></entry></anime>",
    );

    let report = client.search_anime("foo")?;
    assert_eq!(report.parsed, 2);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(titles(&client.store().anime_search), vec!["Bar", "Foo"]);
    Ok(())
}

#[test]
fn test_update_anime_merges_into_list() -> Result<()> {
    let (client, transport) = client();
    transport.route("/malappinfo.php", 200, ANIME_LIST);
    transport.route("/api/animelist/update/5114.xml", 200, "Updated");
    client.fetch_anime_list()?;
    let events = client.subscribe();

    let mut fma = client
        .store()
        .anime_list
        .snapshot()
        .into_iter()
        .find(|a| a.series.id() == Some(5114))
        .map(|a| (*a).clone())
        .expect("fma stored");
    fma.watched_episodes = 13;
    fma.progress.date_start = "2021-03-01".to_string();

    client.update_anime(&fma)?;

    let request = transport.requests().pop().expect("update sent");
    assert_eq!(request.method, Method::Post);
    assert!(request.is_authenticated());
    let body = request.form_value("data").expect("data field");
    assert!(body.contains("<episode>13</episode>"));
    assert!(body.contains("<date_start>03012021</date_start>"));

    let list = client.store().anime_list.snapshot();
    assert_eq!(list.len(), 2);
    let stored = list
        .iter()
        .find(|a| a.series.id() == Some(5114))
        .expect("still listed");
    assert_eq!(stored.watched_episodes, 13);

    assert_eq!(events.try_recv()?, Event::AnimeListUpdated);
    Ok(())
}

#[test]
fn test_add_manga_and_rejections() -> Result<()> {
    let (client, transport) = client();
    transport.route("/api/mangalist/add/2.xml", 201, "Created");

    let mut berserk = Manga::default();
    berserk.series.assign_id(2);
    berserk.series.title = "Berserk".to_string();
    berserk.read_chapters = 1;
    client.add_manga(&berserk)?;
    assert_eq!(titles(&client.store().manga_list), vec!["Berserk"]);

    // Without a catalog id nothing is sent
    let sent = transport.requests().len();
    let err = client.update_manga(&Manga::default()).unwrap_err();
    assert!(matches!(err, ClientError::MissingId(_)));
    assert_eq!(transport.requests().len(), sent);

    // Rejected by the service: store unchanged
    let mut other = Anime::default();
    other.series.assign_id(99);
    other.series.title = "Unknown".to_string();
    let err = client.add_anime(&other).unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 404, .. }));
    assert!(client.store().anime_list.is_empty());
    Ok(())
}

#[test]
fn test_images_are_fetched_once() -> Result<()> {
    let (client, transport) = client();
    transport.route("/images/", 200, "JPEGDATA");

    let mut anime = Anime::default();
    anime.series.image_url = "https://cdn.example.test/images/1.jpg".to_string();

    let first = client.fetch_image(&anime)?;
    let second = client.fetch_image(&anime)?;
    assert_eq!(&*first, b"JPEGDATA");
    assert_eq!(first, second);
    assert_eq!(transport.requests().len(), 1);

    let mut manga = Manga::default();
    manga.series.assign_id(2);
    manga.series.image_url = "https://cdn.example.test/images/manga/2.jpg".to_string();
    client.fetch_manga_image(&manga)?;
    client.fetch_manga_image(&manga)?;
    assert_eq!(transport.requests().len(), 2);

    let stats = client.image_cache_stats();
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.total_size_bytes, 16);

    // No URL: failure without a request
    let err = client.fetch_image(&Anime::default()).unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(transport.requests().len(), 2);
    Ok(())
}

#[test]
fn test_failed_image_fetch_is_retried() -> Result<()> {
    let (client, transport) = client();
    let mut anime = Anime::default();
    anime.series.image_url = "https://cdn.example.test/images/9.jpg".to_string();

    transport.set_unreachable(true);
    assert!(client.fetch_image(&anime).is_err());

    transport.set_unreachable(false);
    transport.route("/images/9.jpg", 200, "PNG");
    assert_eq!(&*client.fetch_image(&anime)?, b"PNG");
    assert_eq!(transport.requests().len(), 2);
    Ok(())
}

#[test]
fn test_concurrent_operations() -> Result<()> {
    let (client, transport) = client();
    transport.route("/malappinfo.php", 200, ANIME_LIST);
    transport.route("/api/manga/search.xml", 200, MANGA_SEARCH);
    let client = Arc::new(client);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                if i % 2 == 0 {
                    client.fetch_anime_list().map(|r| r.stored)
                } else {
                    client.search_manga("berserk").map(|r| r.stored)
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked")?;
    }

    assert_eq!(client.store().anime_list.len(), 2);
    assert_eq!(client.store().manga_search.len(), 1);
    assert!(!client.locks().is_locked(ResourceKind::Share)?);
    Ok(())
}

#[test]
fn test_requests_are_in_flight_together() -> Result<()> {
    let (client, transport) = client();
    transport.route("/malappinfo.php", 200, "<myanimelist></myanimelist>");
    transport.route(
        "/api/anime/search.xml",
        200,
        "<anime><entry><id>1</id><title>Cowboy Bebop</title></entry></anime>",
    );
    transport.route("/images/", 200, "JPEGDATA");
    // Each request waits in the transport until all four are there
    transport.set_gate(Rendezvous::new(4));
    let client = Arc::new(client);

    let mut anime = Anime::default();
    anime.series.image_url = "https://cdn.example.test/images/1.jpg".to_string();

    let spawn = |work: fn(&MalClient, &Anime) -> mal_client::Result<()>| {
        let client = Arc::clone(&client);
        let anime = anime.clone();
        thread::spawn(move || work(&client, &anime))
    };
    let handles = vec![
        spawn(|c, _| c.fetch_anime_list().map(drop)),
        spawn(|c, _| c.fetch_manga_list().map(drop)),
        spawn(|c, _| c.search_anime("bebop").map(drop)),
        spawn(|c, a| c.fetch_image(a).map(drop)),
    ];

    for handle in handles {
        handle.join().expect("worker panicked")?;
    }

    assert_eq!(transport.requests().len(), 4);
    assert_eq!(titles(&client.store().anime_search), vec!["Cowboy Bebop"]);
    for kind in ResourceKind::ALL {
        assert!(!client.locks().is_locked(kind)?);
    }
    Ok(())
}

/// Answer one HTTP request once `gate` opens, reporting whether it did
fn serve_gated(mut stream: TcpStream, gate: &Rendezvous) -> std::io::Result<bool> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" {
            break;
        }
    }

    let met = gate.wait(RENDEZVOUS_TIMEOUT);
    let body = "<myanimelist></myanimelist>";
    write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )?;
    stream.flush()?;
    Ok(met)
}

#[test]
fn test_http_requests_do_not_serialize() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    let gate = Rendezvous::new(2);

    let server = thread::spawn(move || {
        let handlers: Vec<_> = listener
            .incoming()
            .take(2)
            .map(|stream| {
                let gate = Arc::clone(&gate);
                let stream = stream.expect("accepted connection");
                thread::spawn(move || serve_gated(stream, &gate).unwrap_or(false))
            })
            .collect();
        handlers
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .collect::<Vec<bool>>()
    });

    let config = MalConfig {
        base_url: format!("http://127.0.0.1:{port}"),
        username: "tester".to_string(),
        timeout_seconds: 10,
        ..MalConfig::default()
    };
    let credentials = Credentials::new(&config.username, "secret");
    let client = Arc::new(MalClient::with_http(config, credentials, Arc::new(Verbatim))?);

    let anime = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.fetch_anime_list())
    };
    let manga = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.fetch_manga_list())
    };
    anime.join().expect("anime worker panicked")?;
    manga.join().expect("manga worker panicked")?;

    // Both replies were held until the other request reached the server
    let met = server.join().expect("server panicked");
    assert_eq!(met, vec![true, true]);
    Ok(())
}

#[test]
fn test_truncated_list_keeps_collection() -> Result<()> {
    let (client, transport) = client();
    transport.route("/malappinfo.php", 200, ANIME_LIST);
    client.fetch_anime_list()?;
    let events = client.subscribe();

    let cut = ANIME_LIST
        .find("<series_title>Fullmetal")
        .expect("second entry present");
    transport.route("/malappinfo.php", 200, &ANIME_LIST[..cut]);

    let err = client.fetch_anime_list().unwrap_err();
    assert!(matches!(err, ClientError::Malformed { .. }), "{err}");
    assert_eq!(
        titles(&client.store().anime_list),
        vec!["Fullmetal Alchemist: Brotherhood", "Cowboy Bebop"]
    );
    assert!(events.try_recv().is_err());
    Ok(())
}

#[test]
fn test_client_from_config_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[mal]
base_url = "https://mirror.example.test/"
username = "someone"
list_status = "watching"
"#,
    )?;

    let config = Config::from_file(&path)?;
    let transport = MockTransport::default();
    transport.route("/malappinfo.php", 200, "<myanimelist></myanimelist>");
    let credentials = Credentials::new(&config.mal.username, "secret");
    let client = MalClient::new(
        config.mal,
        credentials,
        Box::new(transport.clone()),
        Arc::new(Verbatim),
    );

    let report = client.fetch_manga_list()?;
    assert_eq!(report.parsed, 0);

    let request = &transport.requests()[0];
    assert_eq!(request.url, "https://mirror.example.test/malappinfo.php");
    assert_eq!(request.query_value("u"), Some("someone"));
    assert_eq!(request.query_value("status"), Some("watching"));
    assert_eq!(request.query_value("type"), Some("manga"));
    Ok(())
}
