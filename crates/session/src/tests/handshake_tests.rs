//! Integrationstests ueber echte TCP-Verbindungen
//!
//! Der Server laeuft auf Port 0; die Clients sprechen das Wire-Protokoll
//! selbst (Handshake im Klartext, danach versiegelte Frames). Da der
//! Server eine LocalSet verwendet, laufen Server- und Client-Futures per
//! `tokio::join!` im selben Task.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use fluester_auth::AuthService;
use fluester_core::types::{TransferId, Username};
use fluester_crypto::kdf::{proof_ableiten, session_schluessel_ableiten};
use fluester_crypto::types::SecretBytes;
use fluester_protocol::chunk::{self, ChunkFrame};
use fluester_protocol::control::{
    AuthBeginRequest, AuthProofRequest, ControlMessage, FileAcceptMessage, FileCompleteMessage,
    FileOfferMessage,
};
use fluester_protocol::wire::{FrameCodec, TcpFrame};
use fluester_store::{InMemoryCredentialStore, InMemoryKeyStore};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::Framed;

use crate::server_state::{SessionConfig, SessionState};
use crate::tcp::SessionServer;

const CHUNK: usize = 64 * 1024;

/// Startet einen Server auf Port 0 und gibt Adresse, Shutdown-Sender und
/// das Server-Future zurueck; das Future ist nicht Send (LocalSet) und
/// muss im Test-Task selbst gepollt werden.
async fn testserver() -> (
    SocketAddr,
    watch::Sender<bool>,
    impl std::future::Future<Output = std::io::Result<()>>,
) {
    let auth = Arc::new(AuthService::neu(
        Arc::new(InMemoryCredentialStore::neu()),
        Arc::new(InMemoryKeyStore::neu()),
    ));
    let state = SessionState::neu(SessionConfig::default(), auth);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Port 0 muss bindbar sein");
    let addr = listener.local_addr().expect("lokale Adresse");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = SessionServer::neu(state, addr);
    (addr, shutdown_tx, server.starten_mit_listener(listener, shutdown_rx))
}

async fn naechster_frame(framed: &mut Framed<TcpStream, FrameCodec>) -> TcpFrame {
    match framed.next().await {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => panic!("Frame-Fehler: {e}"),
        None => panic!("Verbindung unerwartet geschlossen"),
    }
}

/// Minimaler Test-Client: fuehrt den Handshake und spricht danach
/// ausschliesslich versiegelt
struct Klient {
    framed: Framed<TcpStream, FrameCodec>,
    session_key: SecretBytes,
}

impl Klient {
    async fn verbinden(addr: SocketAddr, name: &str, passwort: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Verbindung");
        let mut framed = Framed::new(stream, FrameCodec::neu());

        framed
            .send(TcpFrame::Control(ControlMessage::AuthBegin(
                AuthBeginRequest {
                    username: Username::neu(name).expect("gueltiger Testname"),
                },
            )))
            .await
            .expect("auth_begin");

        let salt = match naechster_frame(&mut framed).await {
            TcpFrame::Control(ControlMessage::AuthSalt(antwort)) => antwort.salt,
            andere => panic!("auth_salt erwartet: {andere:?}"),
        };

        let proof = proof_ableiten(passwort, &salt).expect("Proof-Ableitung");
        framed
            .send(TcpFrame::Control(ControlMessage::AuthProof(
                AuthProofRequest {
                    proof: proof.as_bytes().to_vec(),
                },
            )))
            .await
            .expect("auth_proof");

        let ok = match naechster_frame(&mut framed).await {
            TcpFrame::Control(ControlMessage::AuthOk(ok)) => ok,
            andere => panic!("auth_ok erwartet: {andere:?}"),
        };
        assert!(!ok.udp_key.is_empty(), "auth_ok traegt den UDP-Schluessel");

        let session_key = session_schluessel_ableiten(proof.as_bytes(), &ok.session_salt)
            .expect("Session-Schluessel-Ableitung");

        Self { framed, session_key }
    }

    async fn senden(&mut self, nachricht: ControlMessage) {
        let klartext = nachricht.to_bytes().expect("Serialisierung");
        let versiegelt = fluester_crypto::versiegeln(self.session_key.as_bytes(), &klartext, b"")
            .expect("Versiegeln");
        self.framed
            .send(TcpFrame::Sealed(versiegelt))
            .await
            .expect("Senden");
    }

    async fn chunk_senden(&mut self, id: TransferId, offset: u64, daten: &[u8]) {
        let aad = chunk::aad(&id, offset);
        let sealed = fluester_crypto::versiegeln(self.session_key.as_bytes(), daten, &aad)
            .expect("Chunk versiegeln");
        self.framed
            .send(TcpFrame::Chunk(ChunkFrame {
                transfer_id: id,
                offset,
                sealed,
            }))
            .await
            .expect("Chunk senden");
    }

    /// Liest die naechste versiegelte Steuernachricht
    async fn naechste_nachricht(&mut self) -> ControlMessage {
        match naechster_frame(&mut self.framed).await {
            TcpFrame::Sealed(versiegelt) => {
                let klartext =
                    fluester_crypto::oeffnen(self.session_key.as_bytes(), &versiegelt, b"")
                        .expect("Entsiegeln");
                ControlMessage::from_bytes(&klartext).expect("Steuernachricht")
            }
            andere => panic!("Versiegeltes Frame erwartet: {andere:?}"),
        }
    }

    /// Ueberspringt Roster-, System- und Keepalive-Verkehr
    async fn naechste_sachnachricht(&mut self) -> ControlMessage {
        for _ in 0..32 {
            match self.naechste_nachricht().await {
                ControlMessage::System(_)
                | ControlMessage::Roster(_)
                | ControlMessage::Ping
                | ControlMessage::Pong => continue,
                nachricht => return nachricht,
            }
        }
        panic!("Zu viel Begleitverkehr ohne Sachnachricht");
    }

    /// Liest den naechsten Chunk-Frame und entsiegelt ihn
    async fn naechster_chunk(&mut self) -> (TransferId, u64, Vec<u8>) {
        for _ in 0..32 {
            match naechster_frame(&mut self.framed).await {
                TcpFrame::Chunk(chunk) => {
                    let aad = chunk::aad(&chunk.transfer_id, chunk.offset);
                    let daten = fluester_crypto::oeffnen(
                        self.session_key.as_bytes(),
                        &chunk.sealed,
                        &aad,
                    )
                    .expect("Chunk entsiegeln");
                    return (chunk.transfer_id, chunk.offset, daten);
                }
                TcpFrame::Sealed(versiegelt) => {
                    let klartext =
                        fluester_crypto::oeffnen(self.session_key.as_bytes(), &versiegelt, b"")
                            .expect("Entsiegeln");
                    match ControlMessage::from_bytes(&klartext).expect("Steuernachricht") {
                        ControlMessage::System(_)
                        | ControlMessage::Roster(_)
                        | ControlMessage::Progress(_)
                        | ControlMessage::Ping => continue,
                        andere => panic!("Chunk erwartet, erhalten: {andere:?}"),
                    }
                }
                andere => panic!("Chunk erwartet, erhalten: {andere:?}"),
            }
        }
        panic!("Kein Chunk angekommen");
    }
}

#[tokio::test]
async fn test_handshake_und_versiegelter_chat() {
    let (addr, shutdown, server) = testserver().await;

    let klienten = async move {
        let mut alice = Klient::verbinden(addr, "alice", "geheim123").await;
        let mut bob = Klient::verbinden(addr, "bob", "streng456").await;

        alice.senden(ControlMessage::chat("Hallo Bob")).await;

        // Der Chat kommt versiegelt an, mit Absender und Zeitstempel
        match bob.naechste_sachnachricht().await {
            ControlMessage::Chat(chat) => {
                assert_eq!(chat.text, "Hallo Bob");
                assert_eq!(chat.sender, Some(Username::neu("alice").expect("Name")));
                assert!(chat.ts.is_some());
            }
            andere => panic!("Chat erwartet: {andere:?}"),
        }
        // Das Echo erreicht auch die Absenderin selbst
        match alice.naechste_sachnachricht().await {
            ControlMessage::Chat(chat) => assert_eq!(chat.text, "Hallo Bob"),
            andere => panic!("Chat-Echo erwartet: {andere:?}"),
        }

        shutdown.send(true).expect("Shutdown-Signal");
    };

    let (ergebnis, ()) = tokio::join!(server, klienten);
    ergebnis.expect("Server muss sauber stoppen");
}

#[tokio::test]
async fn test_falsches_passwort_wird_abgelehnt() {
    let (addr, shutdown, server) = testserver().await;

    let klient = async move {
        // Erste Anmeldung registriert den Benutzer
        drop(Klient::verbinden(addr, "carol", "richtig789").await);

        // Zweiter Versuch mit falschem Passwort
        let stream = TcpStream::connect(addr).await.expect("Verbindung");
        let mut framed = Framed::new(stream, FrameCodec::neu());
        framed
            .send(TcpFrame::Control(ControlMessage::AuthBegin(
                AuthBeginRequest {
                    username: Username::neu("carol").expect("Name"),
                },
            )))
            .await
            .expect("auth_begin");

        let salt = match naechster_frame(&mut framed).await {
            TcpFrame::Control(ControlMessage::AuthSalt(antwort)) => {
                assert!(!antwort.pending_registration, "carol ist schon registriert");
                antwort.salt
            }
            andere => panic!("auth_salt erwartet: {andere:?}"),
        };

        let proof = proof_ableiten("voellig-falsch", &salt).expect("Proof-Ableitung");
        framed
            .send(TcpFrame::Control(ControlMessage::AuthProof(
                AuthProofRequest {
                    proof: proof.as_bytes().to_vec(),
                },
            )))
            .await
            .expect("auth_proof");

        match naechster_frame(&mut framed).await {
            TcpFrame::Control(ControlMessage::AuthRejected) => {}
            andere => panic!("auth_rejected erwartet: {andere:?}"),
        }
        // Nach der Ablehnung schliesst der Server die Verbindung
        assert!(framed.next().await.is_none());

        shutdown.send(true).expect("Shutdown-Signal");
    };

    let (ergebnis, ()) = tokio::join!(server, klient);
    ergebnis.expect("Server muss sauber stoppen");
}

#[tokio::test]
async fn test_datei_transfer_ueber_tcp() {
    let (addr, shutdown, server) = testserver().await;

    let klienten = async move {
        let mut alice = Klient::verbinden(addr, "alice", "geheim123").await;
        let mut bob = Klient::verbinden(addr, "bob", "streng456").await;

        let id = TransferId::new();
        let inhalt: Vec<u8> = (0..2 * CHUNK).map(|i| (i % 251) as u8).collect();

        alice
            .senden(ControlMessage::FileOffer(FileOfferMessage {
                id,
                filename: "messung.csv".into(),
                size: inhalt.len() as u64,
            }))
            .await;

        // Bob sieht das Angebot und nimmt an
        match bob.naechste_sachnachricht().await {
            ControlMessage::FileOffer(angebot) => {
                assert_eq!(angebot.id, id);
                assert_eq!(angebot.filename, "messung.csv");
                assert_eq!(angebot.size, inhalt.len() as u64);
            }
            andere => panic!("FileOffer erwartet: {andere:?}"),
        }
        bob.senden(ControlMessage::FileAccept(FileAcceptMessage { id }))
            .await;

        // Alice wartet auf die Annahme und streamt dann die Chunks
        match alice.naechste_sachnachricht().await {
            ControlMessage::FileAccept(annahme) => assert_eq!(annahme.id, id),
            andere => panic!("FileAccept erwartet: {andere:?}"),
        }
        for (i, chunk) in inhalt.chunks(CHUNK).enumerate() {
            alice.chunk_senden(id, (i * CHUNK) as u64, chunk).await;
        }
        alice
            .senden(ControlMessage::FileComplete(FileCompleteMessage { id }))
            .await;

        // Bob setzt die Datei aus den Chunks wieder zusammen
        let mut empfangen = Vec::with_capacity(inhalt.len());
        while empfangen.len() < inhalt.len() {
            let (chunk_id, offset, daten) = bob.naechster_chunk().await;
            assert_eq!(chunk_id, id);
            assert_eq!(offset as usize, empfangen.len());
            empfangen.extend_from_slice(&daten);
        }
        assert_eq!(empfangen, inhalt, "Inhalt muss bitgenau ankommen");

        match bob.naechste_sachnachricht().await {
            ControlMessage::FileComplete(abschluss) => assert_eq!(abschluss.id, id),
            andere => panic!("FileComplete erwartet: {andere:?}"),
        }

        shutdown.send(true).expect("Shutdown-Signal");
    };

    let (ergebnis, ()) = tokio::join!(server, klienten);
    ergebnis.expect("Server muss sauber stoppen");
}
